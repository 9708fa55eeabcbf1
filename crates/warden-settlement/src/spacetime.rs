//! Space-time integral and payment amount.
//!
//! ## Formula
//!
//! ```text
//! spacetime = Σ (t[k+1] - t[k]) · (s[k] + s[k+1]) / 2
//! amount    = spacetime · price / (BYTES_PER_MB · SECONDS_PER_DAY)
//! ```
//!
//! `price` is quoted per MB per day. The sum is accumulated doubled and halved
//! once at the end so no half-byte-second is lost per step.

use warden_crypto::blake3::{self, contexts};
use warden_types::{UnixTime, BYTES_PER_MB, SECONDS_PER_DAY};

/// A payment ready to be submitted for one pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentPlan {
    pub start: UnixTime,
    pub end: UnixTime,
    pub spacetime: u128,
    pub amount: u128,
    /// Digest over the samples the amount was computed from.
    pub merkle_root: [u8; 32],
}

impl PaymentPlan {
    pub fn length(&self) -> i64 {
        self.end - self.start
    }
}

/// Trapezoidal integral of `(time, bytes)` samples, in byte-seconds.
///
/// Samples must be ordered by time. Fewer than two samples integrate to zero.
pub fn space_time(samples: &[(UnixTime, u64)]) -> u128 {
    if samples.len() < 2 {
        return 0;
    }
    let twice: u128 = samples
        .windows(2)
        .map(|w| {
            let dt = (w[1].0 - w[0].0).max(0) as u128;
            dt.saturating_mul(u128::from(w[0].1) + u128::from(w[1].1))
        })
        .fold(0u128, |acc, x| acc.saturating_add(x));
    twice / 2
}

/// Currency amount owed for `spacetime` byte-seconds at `price` per MB-day.
pub fn payment_amount(spacetime: u128, price: u128) -> u128 {
    spacetime.saturating_mul(price) / (BYTES_PER_MB * SECONDS_PER_DAY)
}

/// Merkle root over the samples backing a payment.
pub fn payment_digest(samples: &[(UnixTime, u64)]) -> [u8; 32] {
    let mut level: Vec<[u8; 32]> = samples
        .iter()
        .map(|(t, len)| {
            let material =
                blake3::encode_multi_field(&[t.to_le_bytes().as_slice(), len.to_le_bytes().as_slice()]);
            blake3::derive_key(contexts::PAYMENT_LEAF, &material)
        })
        .collect();
    if level.is_empty() {
        return [0u8; 32];
    }

    let inner_key = blake3::derive_key(contexts::PAYMENT_DIGEST, b"");
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut message = [0u8; 64];
                message[..32].copy_from_slice(&pair[0]);
                message[32..].copy_from_slice(right);
                blake3::keyed_hash(&inner_key, &message)
            })
            .collect();
    }
    level[0]
}

/// Work out what is owed since `checkpoint_start`.
///
/// Returns `None` when there is nothing to pay: fewer than two samples in
/// the unpaid range, or an amount that rounds to zero.
pub fn plan_payment(
    samples: &[(UnixTime, u64)],
    checkpoint_start: UnixTime,
    price: u128,
) -> Option<PaymentPlan> {
    let mut unpaid: Vec<(UnixTime, u64)> = samples
        .iter()
        .copied()
        .filter(|(t, _)| *t >= checkpoint_start)
        .collect();
    unpaid.sort_by_key(|(t, _)| *t);

    let spacetime = space_time(&unpaid);
    let amount = payment_amount(spacetime, price);
    if amount == 0 {
        return None;
    }
    let (start, end) = (unpaid.first()?.0, unpaid.last()?.0);
    Some(PaymentPlan {
        start,
        end,
        spacetime,
        amount,
        merkle_root: payment_digest(&unpaid),
    })
}
