// SealedPrefs — AEAD Codec
//
// Seals byte payloads with AES-256-GCM and encodes the result as printable text
// that can be used directly as a substrate key or value.
//
// Blob format (before encoding):
//
//   [nonce: 12 bytes][ciphertext: n bytes][tag: 16 bytes]
//
// Encoding is standard base64 with no padding and no line wrapping.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use rand::RngCore;

use super::{CryptoError, SecretKey};

/// Nonce size in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag size in bytes (128 bits).
pub const TAG_LEN: usize = 16;

fn cipher_for(key: &SecretKey) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: super::KEY_LEN,
        got: key.as_bytes().len(),
    })
}

/// Encrypt `plaintext` under `key` with a freshly drawn nonce.
pub fn encrypt(plaintext: &[u8], key: &SecretKey) -> Result<String, CryptoError> {
    let cipher = cipher_for(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);

    Ok(STANDARD_NO_PAD.encode(blob))
}

/// Decode and authenticate a blob produced by [`encrypt`].
pub fn decrypt(text: &str, key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let blob = STANDARD_NO_PAD.decode(text.as_bytes())?;

    let min = NONCE_LEN + TAG_LEN;
    if blob.len() < min {
        return Err(CryptoError::Truncated {
            len: blob.len(),
            min,
        });
    }

    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    let cipher = cipher_for(key)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Authentication)
}

pub fn encrypt_str(plaintext: &str, key: &SecretKey) -> Result<String, CryptoError> {
    encrypt(plaintext.as_bytes(), key)
}

pub fn decrypt_str(text: &str, key: &SecretKey) -> Result<String, CryptoError> {
    let bytes = decrypt(text, key)?;
    Ok(String::from_utf8(bytes)?)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn flip_bit(text: &str, byte: usize, bit: u8) -> String {
        let mut raw = STANDARD_NO_PAD.decode(text).unwrap();
        raw[byte] ^= 1 << bit;
        STANDARD_NO_PAD.encode(raw)
    }

    #[test]
    fn test_string_round_trip() {
        let key = SecretKey::generate();
        for sample in ["", "a", "hello world", "ünïcødé ✓", "line\nbreak"] {
            let blob = encrypt_str(sample, &key).unwrap();
            assert_eq!(decrypt_str(&blob, &key).unwrap(), sample);
        }
    }

    #[test]
    fn test_blob_is_printable_without_padding_or_wrapping() {
        let key = SecretKey::generate();
        let blob = encrypt(&[0x5Au8; 300], &key).unwrap();

        assert!(!blob.contains('='), "Blob must not carry base64 padding");
        assert!(!blob.contains('\n'), "Blob must not be line-wrapped");
        assert!(blob.chars().all(|c| c.is_ascii_graphic()));
    }

    #[test]
    fn test_blob_layout() {
        let key = SecretKey::generate();
        let blob = encrypt(b"Test", &key).unwrap();
        let raw = STANDARD_NO_PAD.decode(blob).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + 4 + TAG_LEN);
    }

    #[test]
    fn test_same_plaintext_encrypts_differently() {
        let key = SecretKey::generate();
        let first = encrypt_str("same", &key).unwrap();
        let second = encrypt_str("same", &key).unwrap();
        assert_ne!(first, second, "Each encryption must draw a fresh nonce");
    }

    #[test]
    fn test_every_ciphertext_and_tag_bit_flip_is_detected() {
        let key = SecretKey::generate();
        let blob = encrypt_str("tamper me", &key).unwrap();
        let raw_len = STANDARD_NO_PAD.decode(&blob).unwrap().len();

        for byte in NONCE_LEN..raw_len {
            for bit in 0..8 {
                let tampered = flip_bit(&blob, byte, bit);
                let result = decrypt(&tampered, &key);
                assert!(
                    matches!(result, Err(CryptoError::Authentication)),
                    "Flipping bit {} of byte {} must fail authentication",
                    bit,
                    byte
                );
            }
        }
    }

    #[test]
    fn test_nonce_tamper_is_detected() {
        let key = SecretKey::generate();
        let blob = encrypt_str("payload", &key).unwrap();
        let tampered = flip_bit(&blob, 0, 3);
        assert!(decrypt(&tampered, &key).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = encrypt_str("secret", &SecretKey::generate()).unwrap();
        let result = decrypt(&blob, &SecretKey::generate());
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_invalid_encoding_fails() {
        let key = SecretKey::generate();
        let result = decrypt("not base64 at all!!", &key);
        assert!(matches!(result, Err(CryptoError::Encoding(_))));
    }

    #[test]
    fn test_short_blob_fails() {
        let key = SecretKey::generate();
        let short = STANDARD_NO_PAD.encode([0u8; NONCE_LEN - 1]);
        let result = decrypt(&short, &key);
        assert!(matches!(result, Err(CryptoError::Truncated { .. })));
    }

    #[test]
    fn test_non_utf8_payload_fails_as_crypto_error() {
        let key = SecretKey::generate();
        let blob = encrypt(&[0xFF, 0xFE, 0xFD], &key).unwrap();
        assert!(decrypt(&blob, &key).is_ok());
        assert!(matches!(decrypt_str(&blob, &key), Err(CryptoError::Utf8(_))));
    }
}
