//! Pairing-friendly group primitives on BLS12-381.
//!
//! Everything above this crate speaks in terms of the aliases defined here:
//! [`G1`] and [`G2`] (projective points), [`Gt`] (pairing target) and [`Fr`]
//! (scalar field). Points travel as compressed canonical encodings.

use ark_bls12_381::{Bls12_381, G1Projective, G2Projective};
use ark_ec::pairing::{Pairing, PairingOutput};
use ark_ec::{CurveGroup, Group};
use ark_ff::{One, PrimeField, UniformRand};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::ops::Mul;

use crate::blake3::{self, contexts};
use crate::{CryptoError, Result};

/// Scalar field of BLS12-381.
pub type Fr = ark_bls12_381::Fr;

/// First source group.
pub type G1 = G1Projective;

/// Second source group.
pub type G2 = G2Projective;

/// Pairing target group.
pub type Gt = PairingOutput<Bls12_381>;

/// Standard generator of G1.
pub fn g1_generator() -> G1 {
    G1::generator()
}

/// Standard generator of G2.
pub fn g2_generator() -> G2 {
    G2::generator()
}

/// Compute the bilinear pairing `e(p, q)`.
pub fn pairing(p: &G1, q: &G2) -> Gt {
    Bls12_381::pairing(p.into_affine(), q.into_affine())
}

/// Sample a uniformly random scalar.
pub fn random_scalar<R: rand::Rng + ?Sized>(rng: &mut R) -> Fr {
    Fr::rand(rng)
}

/// Hash arbitrary bytes into the scalar field under a registered context.
///
/// 64 bytes of derived output are reduced modulo the field order, so the
/// result is statistically close to uniform.
pub fn hash_to_scalar(context: &str, data: &[u8]) -> Fr {
    let mut wide = [0u8; 64];
    blake3::derive_key_xof(context, data, &mut wide);
    Fr::from_le_bytes_mod_order(&wide)
}

/// Map a storage index string onto G1: `H(index) = g1^{hash(index)}`.
pub fn hash_to_g1(index: &str) -> G1 {
    g1_generator().mul(hash_to_scalar(contexts::TAG_INDEX, index.as_bytes()))
}

/// The exponent chain `[1, x, x^2, ..., x^(n-1)]`.
pub fn power_chain(x: &Fr, n: usize) -> Vec<Fr> {
    let mut out = Vec::with_capacity(n);
    let mut acc = Fr::one();
    for _ in 0..n {
        out.push(acc);
        acc *= x;
    }
    out
}

/// Serialize a group element or scalar in compressed canonical form.
pub fn to_bytes<T: CanonicalSerialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(value.compressed_size());
    value
        .serialize_compressed(&mut buf)
        .map_err(|e| CryptoError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a compressed canonical encoding.
///
/// The input must be exactly the bytes [`to_bytes`] produces for the decoded
/// value, so every element has a single wire form.
pub fn from_bytes<T: CanonicalDeserialize + CanonicalSerialize>(bytes: &[u8]) -> Result<T> {
    let value = T::deserialize_compressed(bytes)
        .map_err(|e| CryptoError::Deserialization(e.to_string()))?;
    if value.compressed_size() != bytes.len() {
        return Err(CryptoError::Deserialization(format!(
            "trailing bytes: expected {}, got {}",
            value.compressed_size(),
            bytes.len()
        )));
    }
    if to_bytes(&value)? != bytes {
        return Err(CryptoError::Deserialization(
            "non-canonical encoding".to_string(),
        ));
    }
    Ok(value)
}
