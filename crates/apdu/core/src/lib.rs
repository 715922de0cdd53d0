//! Wire substrate for contactless wallet cards
//!
//! This crate provides the foundational types for talking to a wallet card over a
//! proximity link:
//!
//! - A tag-length-value codec with a closed set of tags, each bound to the kind of
//!   value it carries ([`tlv`])
//! - Command and response frames ([`command`], [`response`]), including the status
//!   words the card reports
//! - Symmetric payload encryption used once a session key is negotiated
//!   ([`encryption`])
//! - The [`CardTransport`] abstraction every reader backend implements
//!
//! Nothing here knows about cards, wallets or sessions. Those live one layer up.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod encryption;
pub mod response;
pub mod tlv;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::{CommandApdu, Instruction};
pub use encryption::{EncryptionError, EncryptionKey, EncryptionMode};
pub use response::{
    ResponseApdu, ResponseError,
    status::{StatusKind, StatusWord},
};
pub use tlv::{FromTlv, IntoTlv, Tag, Tlv, TlvBuilder, TlvDecoder, TlvError, TlvValue, ValueKind};
pub use transport::{CardTransport, TransportError};

#[cfg(any(test, feature = "mock"))]
pub use transport::mock::MockTransport;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, CardTransport, CommandApdu, EncryptionKey, EncryptionMode, Error,
        FromTlv, Instruction, IntoTlv, ResponseApdu, Result, StatusWord, Tag, Tlv, TlvBuilder,
        TlvDecoder, TlvError, TransportError,
    };
}
