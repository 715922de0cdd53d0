//! Payload encryption
//!
//! Once a session key is negotiated, command and response payloads are encrypted
//! with AES-256-CBC under a zero IV and ISO 7816-4 padding. The frame header stays
//! in the clear; P1 announces the [`EncryptionMode`].

use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Iso7816};
use bytes::{Bytes, BytesMut};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Encryptor = cbc::Encryptor<aes::Aes256>;
type Decryptor = cbc::Decryptor<aes::Aes256>;

const BLOCK_SIZE: usize = 16;
const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Errors raised while encrypting or decrypting a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    /// Encryption is enabled but no session key is available
    #[error("Encryption key is missing")]
    MissingKey,

    /// Key material has the wrong length
    #[error("Invalid encryption key length: {0}")]
    InvalidKeyLength(usize),

    /// Ciphertext is not a whole number of blocks
    #[error("Invalid ciphertext length: {0}")]
    InvalidCiphertextLength(usize),

    /// Padding could not be applied
    #[error("Pad error")]
    Pad,

    /// Padding is malformed after decryption
    #[error("Unpad error")]
    Unpad,
}

/// Payload encryption mode, sent as P1 of every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum EncryptionMode {
    /// Plain payloads
    #[default]
    None = 0x00,
    /// Key agreed from exchanged nonces and the access code
    Fast = 0x01,
    /// Key agreed through ECDH and the access code
    Strong = 0x02,
}

impl EncryptionMode {
    /// P1 value for this mode
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a mode by its P1 value
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::None),
            0x01 => Some(Self::Fast),
            0x02 => Some(Self::Strong),
            _ => None,
        }
    }
}

/// Session key for payload encryption
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl From<[u8; 32]> for EncryptionKey {
    fn from(key: [u8; 32]) -> Self {
        Self(key)
    }
}

impl EncryptionKey {
    /// Create a key from a 32-byte slice
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptionError> {
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt `data`, padding it in ISO 7816 format
    pub fn encrypt(&self, data: &[u8]) -> Result<Bytes, EncryptionError> {
        let mut buf = BytesMut::from(data);
        let msg_len = prepare_padding(&mut buf);

        let encrypted = Encryptor::new_from_slices(&self.0, &ZERO_IV)
            .map_err(|_| EncryptionError::InvalidKeyLength(self.0.len()))?
            .encrypt_padded_mut::<Iso7816>(&mut buf, msg_len)
            .map_err(|_| EncryptionError::Pad)?;

        Ok(Bytes::copy_from_slice(encrypted))
    }

    /// Decrypt `data`, assuming ISO 7816 padding
    pub fn decrypt(&self, data: &[u8]) -> Result<Bytes, EncryptionError> {
        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            return Err(EncryptionError::InvalidCiphertextLength(data.len()));
        }

        let mut buf = BytesMut::from(data);
        let decrypted = Decryptor::new_from_slices(&self.0, &ZERO_IV)
            .map_err(|_| EncryptionError::InvalidKeyLength(self.0.len()))?
            .decrypt_padded_mut::<Iso7816>(&mut buf)
            .map_err(|_| EncryptionError::Unpad)?;

        Ok(Bytes::copy_from_slice(decrypted))
    }
}

// Grow the buffer to the next block boundary; ISO 7816 padding always adds at least one byte.
fn prepare_padding(data: &mut BytesMut) -> usize {
    let len = data.len();
    data.resize(len + BLOCK_SIZE - len % BLOCK_SIZE, 0);

    len
}
