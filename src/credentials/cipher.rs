//! Encryption service boundary
//!
//! Credentials are stored encrypted; this crate treats encryption as an
//! opaque, tamper-evident service. `AesGcmCipher` is the reference
//! implementation: AES-256-GCM with a random nonce, encoded as
//! base64(`nonce || ciphertext || tag`).

use crate::{BridgeError, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Opaque encrypt/decrypt service for credential material
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM cipher keyed from arbitrary key material
pub struct AesGcmCipher {
    key: [u8; 32],
}

impl AesGcmCipher {
    /// Derive a 256-bit key from the given key material
    pub fn new(key_material: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key_material.as_bytes());
        let digest = hasher.finalize();

        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| BridgeError::Crypto(format!("Key init failed: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| BridgeError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|e| BridgeError::Crypto(format!("Base64 decode failed: {}", e)))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(BridgeError::Crypto("Ciphertext too short".to_string()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| BridgeError::Crypto(format!("Key init failed: {}", e)))?;

        let nonce = Nonce::from_slice(&combined[..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(nonce, &combined[NONCE_SIZE..])
            .map_err(|e| BridgeError::Crypto(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| BridgeError::Crypto(format!("UTF-8 decode failed: {}", e)))
    }
}
