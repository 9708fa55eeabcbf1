//! Data-owner key material.
//!
//! ```text
//! SecretKey { sk, XI[i] = x^i }
//! PublicKey { G = g2, BlsPK = g2^sk, U[i] = g1^(x^i), W[i] = g2^(x^i) }
//! ```
//!
//! `U` lives in G1 and `W` in G2 so that `e(mu, W[c]) == e(U[0], nu)` can tie a
//! G1 commitment to its G2 shift by `x^c`. A key set is generated once, then
//! treated as immutable.

use std::io::Read;

use ark_ff::Zero;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::ops::Mul;
use serde::{Deserialize, Serialize};
use warden_crypto::algebra::{self, Fr, G1, G2};
use warden_crypto::CryptoError;
use warden_types::NUM_OF_ATOMS;

use crate::{PdpError, Result};

/// Encoding format version of [`PublicKey::to_bytes`].
const PUBLIC_KEY_FORMAT: u8 = 1;

/// How an atom is folded into a scalar before tagging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomMode {
    /// Hash the atom bytes directly.
    Plain,
    /// XOR the atom with a salted mask bound to its index and position first,
    /// so equal content at different addresses yields unrelated scalars.
    Udf { salt: [u8; 32] },
}

/// Public parameters distributed to keepers and providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub g: G2,
    pub bls_pk: G2,
    pub u: Vec<G1>,
    pub w: Vec<G2>,
    pub atom_mode: AtomMode,
}

/// Secret exponents, held only by the data owner.
#[derive(Clone)]
pub struct SecretKey {
    sk: Fr,
    xi: Vec<Fr>,
}

/// A data owner's complete key material.
#[derive(Clone)]
pub struct KeySet {
    pub public: PublicKey,
    secret: SecretKey,
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("entries", &self.xi.len())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("n", &self.public.n())
            .field("secret", &self.secret)
            .finish()
    }
}

impl SecretKey {
    /// The BLS signing exponent.
    pub fn sk(&self) -> &Fr {
        &self.sk
    }

    /// The exponent chain `x^i`.
    pub fn xi(&self) -> &[Fr] {
        &self.xi
    }
}

impl KeySet {
    /// Generate a key set with `n` entries in each of `U`, `W` and `XI`.
    ///
    /// # Errors
    ///
    /// - [`PdpError::KeysetIncomplete`] if `n` is below `NUM_OF_ATOMS`
    pub fn generate<R: rand::Rng + ?Sized>(n: usize, atom_mode: AtomMode, rng: &mut R) -> Result<Self> {
        if n < NUM_OF_ATOMS {
            return Err(PdpError::KeysetIncomplete {
                available: n,
                required: NUM_OF_ATOMS,
            });
        }

        let mut sk = algebra::random_scalar(rng);
        while sk.is_zero() {
            sk = algebra::random_scalar(rng);
        }
        let mut x = algebra::random_scalar(rng);
        while x.is_zero() {
            x = algebra::random_scalar(rng);
        }

        let xi = algebra::power_chain(&x, n);
        let g1 = algebra::g1_generator();
        let g2 = algebra::g2_generator();
        let u = xi.iter().map(|e| g1.mul(*e)).collect();
        let w = xi.iter().map(|e| g2.mul(*e)).collect();

        tracing::debug!(n, "key set generated");

        Ok(Self {
            public: PublicKey {
                g: g2,
                bls_pk: g2.mul(sk),
                u,
                w,
                atom_mode,
            },
            secret: SecretKey { sk, xi },
        })
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl PublicKey {
    /// Number of entries in the `U`/`W` bases.
    pub fn n(&self) -> usize {
        self.u.len()
    }

    /// Serialize for distribution through the key/value store.
    ///
    /// ```text
    /// version(1) || mode(1) [|| salt(32)] || G || BlsPK || U || W
    /// ```
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![PUBLIC_KEY_FORMAT];
        match &self.atom_mode {
            AtomMode::Plain => buf.push(0),
            AtomMode::Udf { salt } => {
                buf.push(1);
                buf.extend_from_slice(salt);
            }
        }
        serialize_into(&self.g, &mut buf)?;
        serialize_into(&self.bls_pk, &mut buf)?;
        serialize_into(&self.u, &mut buf)?;
        serialize_into(&self.w, &mut buf)?;
        Ok(buf)
    }

    /// Decode a public key published by [`PublicKey::to_bytes`].
    ///
    /// # Errors
    ///
    /// - [`PdpError::Malformed`] on a bad header, truncated input or trailing bytes
    /// - [`PdpError::KeysetIncomplete`] if the bases are shorter than `NUM_OF_ATOMS`
    ///   or of different lengths
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let mut header = [0u8; 2];
        reader
            .read_exact(&mut header)
            .map_err(|e| PdpError::Malformed(format!("public key header: {e}")))?;
        if header[0] != PUBLIC_KEY_FORMAT {
            return Err(PdpError::Malformed(format!(
                "unsupported public key format {}",
                header[0]
            )));
        }
        let atom_mode = match header[1] {
            0 => AtomMode::Plain,
            1 => {
                let mut salt = [0u8; 32];
                reader
                    .read_exact(&mut salt)
                    .map_err(|e| PdpError::Malformed(format!("public key salt: {e}")))?;
                AtomMode::Udf { salt }
            }
            other => {
                return Err(PdpError::Malformed(format!("unknown atom mode {other}")));
            }
        };

        let g: G2 = deserialize_from(&mut reader)?;
        let bls_pk: G2 = deserialize_from(&mut reader)?;
        let u: Vec<G1> = deserialize_from(&mut reader)?;
        let w: Vec<G2> = deserialize_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(PdpError::Malformed(format!(
                "{} trailing bytes after public key",
                reader.len()
            )));
        }
        if u.len() != w.len() || u.len() < NUM_OF_ATOMS {
            return Err(PdpError::KeysetIncomplete {
                available: u.len().min(w.len()),
                required: NUM_OF_ATOMS,
            });
        }

        Ok(Self {
            g,
            bls_pk,
            u,
            w,
            atom_mode,
        })
    }
}

fn serialize_into<T: CanonicalSerialize>(value: &T, buf: &mut Vec<u8>) -> Result<()> {
    value
        .serialize_compressed(buf)
        .map_err(|e| PdpError::Crypto(CryptoError::Serialization(e.to_string())))
}

fn deserialize_from<T: CanonicalDeserialize>(reader: &mut &[u8]) -> Result<T> {
    T::deserialize_compressed(reader)
        .map_err(|e| PdpError::Crypto(CryptoError::Deserialization(e.to_string())))
}
