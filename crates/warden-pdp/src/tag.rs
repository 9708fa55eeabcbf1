//! Per-segment homomorphic tags.
//!
//! ```text
//! a_j   = H_atom(atom_j)                    (Plain)
//!       = H_atom(atom_j XOR mask(salt, index, j))   (Udf)
//! tag   = (g1^(Σ x^j · a_j) + H(index)) · sk
//! ```
//!
//! Tags of different segments add up to a tag over the summed atom scalars,
//! which is what lets a provider answer a whole challenge with one `delta`.

use ark_ff::Zero;
use ark_std::ops::Mul;
use warden_crypto::algebra::{self, Fr, G1};
use warden_crypto::blake3::{self, contexts};
use warden_types::NUM_OF_ATOMS;

use crate::keyset::{AtomMode, KeySet};
use crate::{PdpError, Result};

/// Width in bytes of one atom of `segment`.
///
/// # Errors
///
/// - [`PdpError::InvalidSegmentSize`] unless the segment splits into exactly
///   `NUM_OF_ATOMS` non-empty atoms
pub fn atom_width(segment: &[u8]) -> Result<usize> {
    let width = segment.len() / NUM_OF_ATOMS;
    if width == 0 || segment.len() % NUM_OF_ATOMS != 0 {
        return Err(PdpError::InvalidSegmentSize {
            len: segment.len(),
            atoms: NUM_OF_ATOMS,
            width,
        });
    }
    Ok(width)
}

/// Fold every atom of a segment into a scalar.
///
/// Shared by tag generation and the provider's proof aggregation, which must
/// agree bit for bit.
pub fn atom_scalars(mode: &AtomMode, segment: &[u8], index: &str) -> Result<Vec<Fr>> {
    let width = atom_width(segment)?;
    let scalars = segment
        .chunks_exact(width)
        .enumerate()
        .map(|(j, atom)| match mode {
            AtomMode::Plain => algebra::hash_to_scalar(contexts::ATOM_SCALAR, atom),
            AtomMode::Udf { salt } => {
                let position = (j as u32).to_le_bytes();
                let material = blake3::encode_multi_field(&[
                    salt.as_slice(),
                    index.as_bytes(),
                    position.as_slice(),
                ]);
                let mut masked = vec![0u8; width];
                blake3::derive_key_xof(contexts::ATOM_MASK, &material, &mut masked);
                for (m, a) in masked.iter_mut().zip(atom) {
                    *m ^= a;
                }
                algebra::hash_to_scalar(contexts::ATOM_SCALAR, &masked)
            }
        })
        .collect();
    Ok(scalars)
}

/// Compute the tag of one segment as a group element.
pub fn tag_element(keyset: &KeySet, segment: &[u8], index: &str) -> Result<G1> {
    let secret = keyset.secret();
    if secret.xi().len() < NUM_OF_ATOMS {
        return Err(PdpError::KeysetIncomplete {
            available: secret.xi().len(),
            required: NUM_OF_ATOMS,
        });
    }

    let scalars = atom_scalars(&keyset.public.atom_mode, segment, index)?;
    let power = scalars
        .iter()
        .zip(secret.xi())
        .fold(Fr::zero(), |acc, (a, x)| acc + *a * x);

    let base = algebra::g1_generator().mul(power) + algebra::hash_to_g1(index);
    Ok(base.mul(*secret.sk()))
}

/// Generate the serialized tag of one segment stored under `index`.
///
/// Deterministic: the same key set, bytes and index always yield the same
/// output.
///
/// # Errors
///
/// - [`PdpError::InvalidSegmentSize`] for a segment that does not split into atoms
/// - [`PdpError::KeysetIncomplete`] if the key set lacks exponents
pub fn gen_tag(keyset: &KeySet, segment: &[u8], index: &str) -> Result<Vec<u8>> {
    Ok(algebra::to_bytes(&tag_element(keyset, segment, index)?)?)
}

/// Check a stored tag by recomputing it.
pub fn verify_tag(keyset: &KeySet, segment: &[u8], index: &str, tag: &[u8]) -> Result<bool> {
    Ok(gen_tag(keyset, segment, index)? == tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::SEGMENT_SIZE;

    fn keyset(mode: AtomMode) -> KeySet {
        KeySet::generate(NUM_OF_ATOMS + 8, mode, &mut rand::thread_rng()).expect("generate")
    }

    fn segment(fill: u8) -> Vec<u8> {
        (0..SEGMENT_SIZE).map(|i| (i as u8).wrapping_add(fill)).collect()
    }

    #[test]
    fn test_tag_deterministic() {
        let ks = keyset(AtomMode::Plain);
        let data = segment(1);
        let a = gen_tag(&ks, &data, "blk1_0").expect("tag");
        let b = gen_tag(&ks, &data, "blk1_0").expect("tag");
        assert_eq!(a, b);
        assert!(verify_tag(&ks, &data, "blk1_0", &a).expect("verify"));
    }

    #[test]
    fn test_tag_bound_to_index_and_content() {
        let ks = keyset(AtomMode::Plain);
        let data = segment(1);
        let base = gen_tag(&ks, &data, "blk1_0").expect("tag");
        assert_ne!(base, gen_tag(&ks, &data, "blk1_1").expect("tag"));

        let mut flipped = data.clone();
        flipped[100] ^= 0x01;
        assert_ne!(base, gen_tag(&ks, &flipped, "blk1_0").expect("tag"));
        assert!(!verify_tag(&ks, &flipped, "blk1_0", &base).expect("verify"));
    }

    #[test]
    fn test_invalid_segment_size() {
        let ks = keyset(AtomMode::Plain);
        let result = gen_tag(&ks, &[0u8; 100], "blk1_0");
        assert!(matches!(result, Err(PdpError::InvalidSegmentSize { len: 100, .. })));
        assert!(matches!(
            gen_tag(&ks, &[], "blk1_0"),
            Err(PdpError::InvalidSegmentSize { .. })
        ));
    }

    #[test]
    fn test_smaller_atoms_accepted() {
        let ks = keyset(AtomMode::Plain);
        assert!(gen_tag(&ks, &[3u8; NUM_OF_ATOMS * 4], "blk1_0").is_ok());
    }

    #[test]
    fn test_udf_masks_identical_atoms() {
        let salt = [9u8; 32];
        let data = vec![0xAB; SEGMENT_SIZE];
        let plain = atom_scalars(&AtomMode::Plain, &data, "blk1_0").expect("plain");
        let udf = atom_scalars(&AtomMode::Udf { salt }, &data, "blk1_0").expect("udf");
        // Identical atoms collapse in plain mode but not once masked.
        assert_eq!(plain[0], plain[1]);
        assert_ne!(udf[0], udf[1]);
        assert_ne!(
            udf,
            atom_scalars(&AtomMode::Udf { salt }, &data, "blk1_1").expect("udf")
        );
    }

    #[test]
    fn test_tags_are_additive() {
        let ks = keyset(AtomMode::Plain);
        let d1 = segment(1);
        let d2 = segment(2);
        let t1 = tag_element(&ks, &d1, "a_0_0_0").expect("tag");
        let t2 = tag_element(&ks, &d2, "a_0_1_0").expect("tag");

        let s1 = atom_scalars(&AtomMode::Plain, &d1, "a_0_0_0").expect("scalars");
        let s2 = atom_scalars(&AtomMode::Plain, &d2, "a_0_1_0").expect("scalars");
        let power = s1
            .iter()
            .zip(&s2)
            .zip(ks.secret().xi())
            .fold(Fr::zero(), |acc, ((a, b), x)| acc + (*a + b) * x);
        let expected = (algebra::g1_generator().mul(power)
            + algebra::hash_to_g1("a_0_0_0")
            + algebra::hash_to_g1("a_0_1_0"))
        .mul(*ks.secret().sk());
        assert_eq!(t1 + t2, expected);
    }
}
