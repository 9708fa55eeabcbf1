//! Proof aggregation (provider) and verification (keeper).
//!
//! ```text
//! sums[j] = Σ_i a_{i,j}
//! mu      = Σ_j U[j]   · sums[j]
//! nu      = Σ_j W[c+j] · sums[j]
//! delta   = Σ_i tag_i
//! ```

use ark_ff::Zero;
use ark_std::ops::Mul;
use warden_crypto::algebra::{self, Fr, G1, G2};
use warden_crypto::base58;
use warden_types::NUM_OF_ATOMS;

use crate::challenge::Challenge;
use crate::keyset::PublicKey;
use crate::tag::atom_scalars;
use crate::{PdpError, Result};

/// Delimiter between the components of a proof wire value.
pub const PROOF_DELIMITER: char = '/';

/// An aggregated possession proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proof {
    pub mu: G1,
    pub nu: G2,
    pub delta: G1,
}

/// A proof together with the indices the provider could not serve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofValue {
    pub proof: Proof,
    pub faults: Vec<String>,
}

impl Proof {
    /// The proof of an empty selection.
    pub fn identity() -> Self {
        Self {
            mu: G1::zero(),
            nu: G2::zero(),
            delta: G1::zero(),
        }
    }
}

fn check_range(pk: &PublicKey, c: usize) -> Result<()> {
    let last = c + NUM_OF_ATOMS - 1;
    if last >= pk.w.len() || NUM_OF_ATOMS > pk.u.len() {
        return Err(PdpError::NumOutOfRange {
            index: last,
            len: pk.w.len(),
        });
    }
    Ok(())
}

/// Aggregate the challenged segments and their tags into a proof.
///
/// `segments[i]` and `tags[i]` belong to `chal.indices[i]`.
///
/// # Errors
///
/// - [`PdpError::TagCountMismatch`] if segment and tag counts differ
/// - [`PdpError::NumOutOfRange`] if `c` runs past the end of `W`
/// - [`PdpError::InvalidSegmentSize`] for a segment that does not split into atoms
pub fn gen_proof(
    pk: &PublicKey,
    chal: &Challenge,
    segments: &[Vec<u8>],
    tags: &[Vec<u8>],
) -> Result<Proof> {
    if segments.len() != tags.len() {
        return Err(PdpError::TagCountMismatch {
            segments: segments.len(),
            tags: tags.len(),
        });
    }
    if segments.len() != chal.indices.len() {
        return Err(PdpError::Malformed(format!(
            "{} segments for {} challenged indices",
            segments.len(),
            chal.indices.len()
        )));
    }
    check_range(pk, chal.c)?;

    let mut sums = vec![Fr::zero(); NUM_OF_ATOMS];
    for (segment, index) in segments.iter().zip(&chal.indices) {
        for (sum, a) in sums.iter_mut().zip(atom_scalars(&pk.atom_mode, segment, index)?) {
            *sum += a;
        }
    }

    let mut mu = G1::zero();
    let mut nu = G2::zero();
    for (j, sum) in sums.iter().enumerate() {
        mu += pk.u[j].mul(*sum);
        nu += pk.w[chal.c + j].mul(*sum);
    }

    let mut delta = G1::zero();
    for tag in tags {
        delta += algebra::from_bytes::<G1>(tag)?;
    }

    Ok(Proof { mu, nu, delta })
}

/// Check a proof against the challenge it answers.
///
/// `chal` must list only the indices the proof covers, i.e. with any reported
/// faults already removed.
///
/// # Errors
///
/// - [`PdpError::EmptyChallenge`] if nothing is challenged
/// - [`PdpError::VerifyStepOne`] if the tags do not match the data commitment
/// - [`PdpError::VerifyStepTwo`] if `mu` and `nu` disagree
pub fn verify_proof(pk: &PublicKey, chal: &Challenge, proof: &Proof) -> Result<()> {
    if chal.indices.is_empty() {
        return Err(PdpError::EmptyChallenge);
    }
    check_range(pk, chal.c)?;

    let hashed = chal
        .indices
        .iter()
        .fold(G1::zero(), |acc, index| acc + algebra::hash_to_g1(index));

    if algebra::pairing(&proof.delta, &pk.g) != algebra::pairing(&(hashed + proof.mu), &pk.bls_pk) {
        return Err(PdpError::VerifyStepOne);
    }

    if algebra::pairing(&proof.mu, &pk.w[chal.c]) != algebra::pairing(&pk.u[0], &proof.nu) {
        return Err(PdpError::VerifyStepTwo);
    }

    Ok(())
}

impl ProofValue {
    /// `base58(mu)/base58(nu)/base58(delta)[/base58(cbor(faults))]`
    pub fn encode(&self) -> Result<String> {
        let mut parts = vec![
            base58::encode_element(&self.proof.mu)?,
            base58::encode_element(&self.proof.nu)?,
            base58::encode_element(&self.proof.delta)?,
        ];
        if !self.faults.is_empty() {
            let mut buf = Vec::new();
            ciborium::into_writer(&self.faults, &mut buf)
                .map_err(|e| PdpError::Malformed(format!("fault list encode: {e}")))?;
            parts.push(base58::encode(&buf));
        }
        Ok(parts.join(&PROOF_DELIMITER.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(PROOF_DELIMITER).collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(PdpError::Malformed(format!(
                "proof has {} components",
                parts.len()
            )));
        }
        let proof = Proof {
            mu: base58::decode_element(parts[0])?,
            nu: base58::decode_element(parts[1])?,
            delta: base58::decode_element(parts[2])?,
        };
        let faults = match parts.get(3) {
            Some(encoded) => {
                let bytes = base58::decode(encoded)?;
                ciborium::from_reader(bytes.as_slice())
                    .map_err(|e| PdpError::Malformed(format!("fault list decode: {e}")))?
            }
            None => Vec::new(),
        };
        Ok(Self { proof, faults })
    }
}
