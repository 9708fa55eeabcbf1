//! Domain-separated BLAKE3 hashing for the Warden protocol.
//!
//! Every place the protocol maps bytes into the scalar field or into G1 goes
//! through a registered context string, so a tag-index hash can never collide
//! with an atom hash or a payment digest.
//!
//! ## Modes
//!
//! - [`hash`] — Pure hashing
//! - [`derive_key`] — Context-bound derivation (hash-to-scalar inputs, masks)
//! - [`keyed_hash`] — Keyed PRF

/// Registered BLAKE3 context strings.
/// Using an unregistered context string is a protocol violation.
pub mod contexts {
    pub const TAG_INDEX: &str = "Warden v1 tag-index";
    pub const ATOM_SCALAR: &str = "Warden v1 atom-scalar";
    pub const ATOM_MASK: &str = "Warden v1 atom-mask";
    pub const PAYMENT_DIGEST: &str = "Warden v1 payment-digest";
    pub const PAYMENT_LEAF: &str = "Warden v1 payment-leaf";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[
        TAG_INDEX,
        ATOM_SCALAR,
        ATOM_MASK,
        PAYMENT_DIGEST,
        PAYMENT_LEAF,
    ];
}

/// Compute BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive 32 bytes using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (must start with "Warden v1 ")
/// * `key_material` - The input material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let hash = hasher.finalize();
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Derive a variable-length output in key derivation mode.
///
/// Used for the atom XOR masks, whose width follows the atom width.
pub fn derive_key_xof(context: &str, key_material: &[u8], output: &mut [u8]) {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let mut reader = hasher.finalize_xof();
    reader.fill(output);
}

/// Compute a keyed BLAKE3 hash (MAC/PRF).
pub fn keyed_hash(key: &[u8; 32], message: &[u8]) -> [u8; 32] {
    *::blake3::keyed_hash(key, message).as_bytes()
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_context_strings_prefixed() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(
                ctx.starts_with("Warden v1 "),
                "Context string '{ctx}' has wrong prefix"
            );
        }
    }

    #[test]
    fn test_derive_key_different_contexts() {
        let key1 = derive_key(contexts::TAG_INDEX, b"blk1_0");
        let key2 = derive_key(contexts::ATOM_SCALAR, b"blk1_0");
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_xof_prefix_matches_fixed_output() {
        let mut long = [0u8; 64];
        derive_key_xof(contexts::ATOM_MASK, b"seed", &mut long);
        assert_eq!(&long[..32], &derive_key(contexts::ATOM_MASK, b"seed"));
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
        assert_eq!(&encoded[9..13], &5u32.to_le_bytes());
        assert_eq!(&encoded[13..18], b"world");
    }

    #[test]
    fn test_multi_field_is_unambiguous() {
        let a = encode_multi_field(&[b"ab", b"c"]);
        let b = encode_multi_field(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_registered_context() {
        assert!(is_registered_context("Warden v1 tag-index"));
        assert!(!is_registered_context("Warden v1 made-up-context"));
    }
}
