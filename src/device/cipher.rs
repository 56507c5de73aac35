//! AES-128-CTR transform applied to every packet that crosses the radio link.
//!
//! The shades expect a fixed all-zero initial counter block. Every packet therefore reuses the
//! same keystream: identical plaintexts produce identical ciphertexts and XOR-ing two frames
//! cancels the keystream. This is what the hardware speaks, so it must stay this way for the
//! shades to understand us.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::error::ConfigError;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

pub const KEY_LENGTH: usize = 16;

const ZERO_COUNTER: [u8; 16] = [0; 16];

/// Pre-shared key holder. Cheap to clone and immutable once loaded.
#[derive(Clone)]
pub struct CipherLayer {
    key: [u8; KEY_LENGTH],
}

impl CipherLayer {
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        CipherLayer { key }
    }

    /// Load the key from its 32 character hex representation.
    pub fn from_hex(key: Option<&str>) -> Result<Self, ConfigError> {
        let key = match key.map(str::trim) {
            None | Some("") => return Err(ConfigError::MissingKey),
            Some(key) => key,
        };

        if key.len() != KEY_LENGTH * 2 {
            return Err(ConfigError::InvalidKeyLength { length: key.len() });
        }

        let mut bytes = [0u8; KEY_LENGTH];
        hex::decode_to_slice(key, &mut bytes)?;
        Ok(CipherLayer::new(bytes))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.apply(plaintext)
    }

    /// Never fails; whether the output makes sense is up to the caller.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        self.apply(ciphertext)
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        // a fresh keystream starting at counter zero for every packet
        let mut cipher = Aes128Ctr::new(&self.key.into(), &ZERO_COUNTER.into());
        let mut buffer = data.to_vec();
        cipher.apply_keystream(&mut buffer);
        buffer
    }
}

impl std::fmt::Debug for CipherLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherLayer").field("key", &"<redacted>").finish()
    }
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
