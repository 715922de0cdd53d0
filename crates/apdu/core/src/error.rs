//! Core error type for all wire-level operations
//!
//! Each layer has its own error enum so callers can match precisely. This type
//! gathers them for code that only needs to bubble a failure up.

use crate::{EncryptionError, ResponseError, TlvError, TransportError};

/// Result alias for wire-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// TLV encoding or decoding failed
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// Response frame could not be parsed
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Payload encryption or decryption failed
    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}
