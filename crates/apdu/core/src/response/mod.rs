//! Response frames
//!
//! A response is the payload followed by the two status bytes.

pub mod status;

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::encryption::{EncryptionError, EncryptionKey};
use crate::tlv::{Tag, TlvDecoder, TlvError};
use status::StatusWord;

/// Unit of the [`Tag::Pause`] value
pub const PAUSE_UNIT: Duration = Duration::from_millis(10);

/// Errors raised while parsing a response frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    /// Fewer than two bytes were received
    #[error("Response too short: {0} bytes")]
    TooShort(usize),
}

/// A response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    data: Bytes,
    status: StatusWord,
}

impl ResponseApdu {
    /// Create a response from its payload and status
    pub fn new(data: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            data: data.into(),
            status: status.into(),
        }
    }

    /// Parse raw response bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ResponseError> {
        let Some((data, sw)) = raw.split_last_chunk::<2>() else {
            return Err(ResponseError::TooShort(raw.len()));
        };

        let response = Self {
            data: Bytes::copy_from_slice(data),
            status: StatusWord::new(sw[0], sw[1]),
        };
        trace!(
            status = %response.status,
            len = response.data.len(),
            "Parsed response"
        );

        Ok(response)
    }

    /// Serialize the frame
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 2);
        buf.put_slice(&self.data);
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }

    /// Response payload
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Remaining security delay announced by the card
    ///
    /// Security delay responses are never encrypted. A missing or unreadable pause
    /// value yields `None`.
    pub fn security_delay(&self) -> Option<Duration> {
        if !self.status.is_security_delay() {
            return None;
        }
        let decoder = TlvDecoder::new(&self.data).ok()?;
        let units: u32 = decoder.decode_optional(Tag::Pause).ok()??;
        Some(PAUSE_UNIT * units)
    }

    /// Decrypt the payload with the session key
    ///
    /// Empty payloads are left as they are.
    pub fn decrypt(self, key: &EncryptionKey) -> Result<Self, EncryptionError> {
        if self.data.is_empty() {
            return Ok(self);
        }
        let data = key.decrypt(&self.data)?;
        Ok(Self { data, ..self })
    }

    /// Decode the payload as TLV
    pub fn tlv(&self) -> Result<TlvDecoder, TlvError> {
        TlvDecoder::new(&self.data)
    }
}
