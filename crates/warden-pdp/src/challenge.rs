//! Seeded challenge derivation.
//!
//! A challenge is a pure function of its seed (the issuing keeper's challenge
//! time): both sides seed the same ChaCha20 stream and draw the base offset
//! `c` from `[1, N - NUM_OF_ATOMS)`, so a provider can rebuild exactly the
//! selection the keeper will verify against.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use warden_crypto::base58;
use warden_types::NUM_OF_ATOMS;

use crate::{PdpError, Result};

/// A challenge round as seen by keeper and provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    /// Seed the round was derived from.
    pub seed: i64,
    /// Base offset into the `W` array.
    pub c: usize,
    /// Challenged segment indices (`<block>_<offset>`).
    pub indices: Vec<String>,
}

/// The challenge as it travels to the provider: `base58(cbor(pub_c, indices))`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeValue {
    pub pub_c: i64,
    pub indices: Vec<String>,
}

/// Derive the base offset `c` for a key of size `n`.
///
/// # Errors
///
/// - [`PdpError::NumOutOfRange`] if the key is too small to leave any nonzero
///   offset for a full segment
pub fn derive_offset(seed: i64, n: usize) -> Result<usize> {
    let upper = n.saturating_sub(NUM_OF_ATOMS);
    if upper <= 1 {
        return Err(PdpError::NumOutOfRange {
            index: NUM_OF_ATOMS,
            len: n,
        });
    }
    let mut rng = ChaCha20Rng::seed_from_u64(seed as u64);
    loop {
        let c = rng.gen_range(0..upper);
        if c != 0 {
            return Ok(c);
        }
    }
}

/// Build the challenge for `seed` over the given segment indices.
pub fn gen_challenge(seed: i64, n: usize, indices: Vec<String>) -> Result<Challenge> {
    let c = derive_offset(seed, n)?;
    Ok(Challenge { seed, c, indices })
}

/// Pick the challenged segment of a block holding `offset` segments.
pub fn elect_offset(seed: i64, offset: i64) -> i64 {
    if offset > 0 {
        seed.rem_euclid(offset)
    } else {
        0
    }
}

impl Challenge {
    /// The wire value sent to the provider.
    pub fn to_value(&self) -> ChallengeValue {
        ChallengeValue {
            pub_c: self.c as i64,
            indices: self.indices.clone(),
        }
    }

    /// Drop the indices the provider reported as faulty.
    pub fn without(&self, faults: &[String]) -> Challenge {
        Challenge {
            seed: self.seed,
            c: self.c,
            indices: self
                .indices
                .iter()
                .filter(|i| !faults.contains(i))
                .cloned()
                .collect(),
        }
    }
}

impl ChallengeValue {
    pub fn encode(&self) -> Result<String> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PdpError::Malformed(format!("challenge encode: {e}")))?;
        Ok(base58::encode(&buf))
    }

    pub fn decode(text: &str) -> Result<Self> {
        let bytes = base58::decode(text)?;
        ciborium::from_reader(bytes.as_slice())
            .map_err(|e| PdpError::Malformed(format!("challenge decode: {e}")))
    }
}
