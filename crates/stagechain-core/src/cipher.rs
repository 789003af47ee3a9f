//! Obfuscation cipher: repeating-key XOR followed by standard Base64.
//!
//! This hides payloads at rest. It is not encryption in any meaningful sense:
//! anyone holding every stage of a chain can reverse it.
//!
//! The cipher works on raw bytes throughout. Text is never split into
//! multi-byte units, so UTF-8 scripts round-trip exactly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{ChainError, Result};

/// XOR `data` with `key` cycled to its length.
///
/// XOR is self-inverse, so this is both the encode and decode step.
pub fn xor_cycle(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.is_empty() {
        return Err(ChainError::EmptyKey);
    }
    Ok(data
        .iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect())
}

/// XOR `plaintext` with `key`, then Base64-encode the result.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<String> {
    let mixed = xor_cycle(plaintext, key)?;
    Ok(STANDARD.encode(mixed))
}

/// Exact inverse of [`encrypt`].
pub fn decrypt(encoded: &str, key: &[u8]) -> Result<Vec<u8>> {
    if key.is_empty() {
        return Err(ChainError::EmptyKey);
    }
    let mixed = STANDARD.decode(encoded.trim())?;
    xor_cycle(&mixed, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // 'A' ^ 'A' = 0, 'B' ^ 'A' = 3
        let out = encrypt(b"AB", b"A").unwrap();
        assert_eq!(out, STANDARD.encode([0x00, 0x03]));
        assert_eq!(decrypt(&out, b"A").unwrap(), b"AB");
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(encrypt(b"x", b""), Err(ChainError::EmptyKey)));
        assert!(matches!(decrypt("eA==", b""), Err(ChainError::EmptyKey)));
    }

    #[test]
    fn test_empty_plaintext() {
        let out = encrypt(b"", b"key").unwrap();
        assert_eq!(out, "");
        assert_eq!(decrypt(&out, b"key").unwrap(), b"");
    }

    #[test]
    fn test_multibyte_text_roundtrip() {
        let script = "print(\"héllo ✓ 世界\")";
        let out = encrypt(script.as_bytes(), b"k3y").unwrap();
        let back = decrypt(&out, b"k3y").unwrap();
        assert_eq!(String::from_utf8(back).unwrap(), script);
    }

    #[test]
    fn test_output_is_transport_safe() {
        let out = encrypt(&[0u8, 255, 10, 13, 34, 39, 92], b"\xff").unwrap();
        assert!(out
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='));
    }

    #[test]
    fn test_malformed_input_rejected() {
        assert!(matches!(decrypt("not base64!", b"k"), Err(ChainError::Decode(_))));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in prop::collection::vec(any::<u8>(), 0..512),
                          key in prop::collection::vec(any::<u8>(), 1..64)) {
            let encoded = encrypt(&data, &key).unwrap();
            prop_assert_eq!(decrypt(&encoded, &key).unwrap(), data);
        }

        #[test]
        fn prop_xor_self_inverse(data in prop::collection::vec(any::<u8>(), 0..256),
                                 key in prop::collection::vec(any::<u8>(), 1..32)) {
            let once = xor_cycle(&data, &key).unwrap();
            prop_assert_eq!(xor_cycle(&once, &key).unwrap(), data);
        }
    }
}
