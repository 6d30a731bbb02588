//! Authenticated encryption for tokens at rest
//!
//! Blob layout, base64-encoded as a single string:
//! `salt (64) | iv (12) | tag (16) | ciphertext`.
//! A per-blob key is derived from the process secret and the salt with
//! HMAC-SHA256, then used with AES-256-GCM.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{Error, Result};

const SALT_LEN: usize = 64;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct TokenCipher {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.len() < 16 {
            return Err(Error::Crypto(
                "token encryption secret must be at least 16 bytes".to_string(),
            ));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn cipher_for(&self, salt: &[u8]) -> Result<Aes256Gcm> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|e| Error::Crypto(format!("invalid secret: {}", e)))?;
        mac.update(salt);
        let key = mac.finalize().into_bytes();
        Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Crypto(format!("invalid key: {}", e)))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let cipher = self.cipher_for(&salt)?;
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| Error::Crypto(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&buffer);
        Ok(BASE64.encode(blob))
    }

    /// Any malformed, truncated or tampered blob is an error, never an empty result
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|e| Error::Crypto(format!("invalid token encoding: {}", e)))?;
        if blob.len() < HEADER_LEN {
            return Err(Error::Crypto(format!(
                "token blob too short: {} bytes",
                blob.len()
            )));
        }

        let (salt, rest) = blob.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let cipher = self.cipher_for(salt)?;
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer, Tag::from_slice(tag))
            .map_err(|_| Error::Crypto("token authentication failed (wrong secret or tampered data)".to_string()))?;

        String::from_utf8(buffer).map_err(|e| Error::Crypto(format!("token is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-0123456789";

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = TokenCipher::new(SECRET).unwrap();
        let blob = cipher.encrypt("ya29.access-token").unwrap();
        assert_ne!(blob, "ya29.access-token");
        assert_eq!(cipher.decrypt(&blob).unwrap(), "ya29.access-token");
    }

    #[test]
    fn test_blobs_are_salted() {
        let cipher = TokenCipher::new(SECRET).unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let blob = TokenCipher::new(SECRET).unwrap().encrypt("token").unwrap();
        let other = TokenCipher::new("another-secret-abcdefghij").unwrap();
        assert!(matches!(other.decrypt(&blob), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_tampered_blob_fails() {
        let cipher = TokenCipher::new(SECRET).unwrap();
        let mut raw = BASE64.decode(cipher.encrypt("token").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(cipher.decrypt(&BASE64.encode(raw)).is_err());
    }

    #[test]
    fn test_short_or_malformed_blob_fails() {
        let cipher = TokenCipher::new(SECRET).unwrap();
        assert!(cipher.decrypt("").is_err());
        assert!(cipher.decrypt("not base64 !!").is_err());
        assert!(cipher.decrypt(&BASE64.encode([0u8; HEADER_LEN])).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenCipher::new("short").is_err());
    }
}
