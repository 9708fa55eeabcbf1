//! Provider-side challenge handling.
//!
//! The responder rebuilds the challenge from the keeper's challenge time,
//! refuses a `pub_c` it cannot reproduce, and folds whatever segments it
//! still holds into a proof. Segments it cannot find are reported back as
//! faults instead of failing the round.

use std::collections::HashMap;

use crate::challenge::{derive_offset, Challenge, ChallengeValue};
use crate::keyset::PublicKey;
use crate::proof::{gen_proof, Proof, ProofValue};
use crate::{PdpError, Result};

/// A segment together with its tag, as held by a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSegment {
    pub data: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Local lookup of stored segments by index.
pub trait SegmentSource {
    fn load(&self, index: &str) -> Option<StoredSegment>;
}

impl SegmentSource for HashMap<String, StoredSegment> {
    fn load(&self, index: &str) -> Option<StoredSegment> {
        self.get(index).cloned()
    }
}

/// Answers challenges for one data owner's key.
#[derive(Debug)]
pub struct ChallengeResponder<S> {
    public: PublicKey,
    source: S,
}

impl<S: SegmentSource> ChallengeResponder<S> {
    pub fn new(public: PublicKey, source: S) -> Self {
        Self { public, source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Answer a challenge issued at `chal_time`.
    ///
    /// # Errors
    ///
    /// - [`PdpError::Malformed`] if the challenge value does not decode
    /// - [`PdpError::ChallengeMismatch`] if `pub_c` is not the offset derived
    ///   from `chal_time`
    pub fn respond(&self, chal_time: i64, value: &str) -> Result<ProofValue> {
        let value = ChallengeValue::decode(value)?;
        let c = derive_offset(chal_time, self.public.n())?;
        if value.pub_c < 0 || value.pub_c as u64 != c as u64 {
            return Err(PdpError::ChallengeMismatch {
                derived: c as u64,
                received: value.pub_c as u64,
            });
        }

        let mut present = Vec::with_capacity(value.indices.len());
        let mut segments = Vec::with_capacity(value.indices.len());
        let mut tags = Vec::with_capacity(value.indices.len());
        let mut faults = Vec::new();
        for index in value.indices {
            match self.source.load(&index) {
                Some(stored) => {
                    present.push(index);
                    segments.push(stored.data);
                    tags.push(stored.tag);
                }
                None => faults.push(index),
            }
        }

        if present.is_empty() {
            tracing::warn!(chal_time, faults = faults.len(), "no challenged segment held");
            return Ok(ProofValue {
                proof: Proof::identity(),
                faults,
            });
        }
        if !faults.is_empty() {
            tracing::debug!(chal_time, faults = faults.len(), "answering with faults");
        }

        let chal = Challenge {
            seed: chal_time,
            c,
            indices: present,
        };
        let proof = gen_proof(&self.public, &chal, &segments, &tags)?;
        Ok(ProofValue { proof, faults })
    }

    /// Answer a challenge and encode the result for the wire.
    pub fn respond_text(&self, chal_time: i64, value: &str) -> Result<String> {
        self.respond(chal_time, value)?.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::gen_challenge;
    use crate::keyset::{AtomMode, KeySet};
    use crate::proof::verify_proof;
    use crate::tag::gen_tag;
    use warden_types::SEGMENT_SIZE;

    const TEST_N: usize = 256;

    fn setup(count: usize) -> (KeySet, HashMap<String, StoredSegment>, Vec<String>) {
        let keyset =
            KeySet::generate(TEST_N, AtomMode::Plain, &mut rand::thread_rng()).expect("generate");
        let mut store = HashMap::new();
        let mut indices = Vec::new();
        for i in 0..count {
            let index = format!("u_1_{i}_0");
            let data = vec![i as u8 + 1; SEGMENT_SIZE];
            let tag = gen_tag(&keyset, &data, &index).expect("tag");
            store.insert(index.clone(), StoredSegment { data, tag });
            indices.push(index);
        }
        (keyset, store, indices)
    }

    #[test]
    fn test_respond_verifies() {
        let (keyset, store, indices) = setup(2);
        let chal = gen_challenge(1_700_000_000, TEST_N, indices).expect("challenge");
        let responder = ChallengeResponder::new(keyset.public.clone(), store);

        let text = responder
            .respond_text(chal.seed, &chal.to_value().encode().expect("encode"))
            .expect("respond");
        let value = ProofValue::decode(&text).expect("decode");
        assert!(value.faults.is_empty());
        verify_proof(&keyset.public, &chal, &value.proof).expect("verify");
    }

    #[test]
    fn test_missing_segments_reported_as_faults() {
        let (keyset, mut store, indices) = setup(3);
        store.remove(&indices[1]);
        let chal = gen_challenge(99, TEST_N, indices.clone()).expect("challenge");
        let responder = ChallengeResponder::new(keyset.public.clone(), store);

        let value = responder
            .respond(chal.seed, &chal.to_value().encode().expect("encode"))
            .expect("respond");
        assert_eq!(value.faults, vec![indices[1].clone()]);
        verify_proof(&keyset.public, &chal.without(&value.faults), &value.proof)
            .expect("verify");
    }

    #[test]
    fn test_all_missing_returns_identity() {
        let (keyset, _, indices) = setup(2);
        let chal = gen_challenge(5, TEST_N, indices.clone()).expect("challenge");
        let responder = ChallengeResponder::new(keyset.public.clone(), HashMap::new());

        let value = responder
            .respond(chal.seed, &chal.to_value().encode().expect("encode"))
            .expect("respond");
        assert_eq!(value.proof, Proof::identity());
        assert_eq!(value.faults, indices);
    }

    #[test]
    fn test_mismatched_offset_rejected() {
        let (keyset, store, indices) = setup(1);
        let chal = gen_challenge(5, TEST_N, indices).expect("challenge");
        let responder = ChallengeResponder::new(keyset.public.clone(), store);

        let mut forged = chal.to_value();
        forged.pub_c += 1;
        let result = responder.respond(chal.seed, &forged.encode().expect("encode"));
        assert!(matches!(result, Err(PdpError::ChallengeMismatch { .. })));
    }
}
