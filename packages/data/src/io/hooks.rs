//! Compression and encryption hooks for the IO pipeline

use crate::errors::{DataError, Result};
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, payload: &[u8]) -> Result<Vec<u8>>;
    async fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait Encryptor: Send + Sync {
    async fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>>;
    async fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(6)
    }
}

#[async_trait]
impl Compressor for GzipCompressor {
    async fn compress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(payload)
            .map_err(|e| DataError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| DataError::Compression(e.to_string()))
    }

    async fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(payload);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| DataError::Compression(e.to_string()))?;
        Ok(out)
    }
}

pub const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// ChaCha20-Poly1305 with a fresh random nonce prefixed to every ciphertext
pub struct ChaChaEncryptor {
    cipher: ChaCha20Poly1305,
}

impl ChaChaEncryptor {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Derive the key as SHA-256 of the passphrase
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(&key)
    }
}

impl std::fmt::Debug for ChaChaEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChaChaEncryptor")
    }
}

#[async_trait]
impl Encryptor for ChaChaEncryptor {
    async fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|e| DataError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_SIZE + TAG_SIZE {
            return Err(DataError::Encryption("data too short".to_string()));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                DataError::Encryption("decryption failed (wrong key or tampered data)".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gzip_round_trip() {
        let gzip = GzipCompressor::default();
        let payload = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(10);

        let packed = gzip.compress(&payload).await.unwrap();
        assert!(packed.len() < payload.len());
        assert_eq!(gzip.decompress(&packed).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_gzip_rejects_garbage() {
        let err = GzipCompressor::default().decompress(b"not gzip").await;
        assert!(matches!(err, Err(DataError::Compression(_))));
    }

    #[tokio::test]
    async fn test_chacha_uses_fresh_nonce() {
        let encryptor = ChaChaEncryptor::from_passphrase("secret");

        let a = encryptor.encrypt(b"hello").await.unwrap();
        let b = encryptor.encrypt(b"hello").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(encryptor.decrypt(&a).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_chacha_wrong_key_fails() {
        let sealed = ChaChaEncryptor::from_passphrase("right")
            .encrypt(b"payload")
            .await
            .unwrap();

        let err = ChaChaEncryptor::from_passphrase("wrong").decrypt(&sealed).await;
        assert!(matches!(err, Err(DataError::Encryption(_))));
        assert!(ChaChaEncryptor::from_passphrase("right")
            .decrypt(&sealed[..10])
            .await
            .is_err());
    }
}
