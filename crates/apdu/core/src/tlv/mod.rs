//! Tag-length-value codec
//!
//! Every element is a one-byte tag, a length and the value bytes. The length is a
//! single byte when it is below `0xFF`; otherwise the byte `0xFF` is followed by the
//! length as a big-endian `u16`.
//!
//! Tags form a closed set ([`Tag`]) and each tag is bound to a [`ValueKind`]. The
//! [`TlvBuilder`] renders values according to that kind and the [`TlvDecoder`]
//! checks it when a value is read back.

mod builder;
mod decoder;
mod error;
mod tag;
mod value;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

pub use builder::TlvBuilder;
pub use decoder::TlvDecoder;
pub use error::TlvError;
pub use tag::{Tag, ValueKind};
pub use value::{FromTlv, IntoTlv, TlvValue};

/// Marker byte announcing a two-byte length
pub const EXTENDED_LENGTH_MARKER: u8 = 0xFF;

/// Largest value length the format can express
pub const MAX_VALUE_LENGTH: usize = u16::MAX as usize;

/// A single TLV element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    tag: Tag,
    value: Bytes,
}

impl Tlv {
    /// Create an element from a tag and its raw value bytes
    pub fn new(tag: Tag, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// The element tag
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    /// Raw value bytes
    pub const fn value(&self) -> &Bytes {
        &self.value
    }

    /// Length of the value in bytes
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the value is empty
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Append the encoded element to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), TlvError> {
        let len = self.value.len();
        if len > MAX_VALUE_LENGTH {
            return Err(TlvError::ValueTooLong { tag: self.tag, len });
        }

        buf.put_u8(self.tag.code());
        if len < EXTENDED_LENGTH_MARKER as usize {
            buf.put_u8(len as u8);
        } else {
            buf.put_u8(EXTENDED_LENGTH_MARKER);
            buf.put_u16(len as u16);
        }
        buf.put_slice(&self.value);

        Ok(())
    }

    /// Encode a sequence of elements, preserving their order
    pub fn encode_all(elements: &[Self]) -> Result<Bytes, TlvError> {
        let mut buf = BytesMut::new();
        for element in elements {
            element.encode_into(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Parse a byte sequence into elements
    ///
    /// Elements with tag codes outside the known set are skipped. Truncated input is
    /// an error.
    pub fn parse_all(data: &[u8]) -> Result<Vec<Self>, TlvError> {
        let mut elements = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            let code = data[offset];
            offset += 1;

            let len = match data.get(offset) {
                Some(&EXTENDED_LENGTH_MARKER) => {
                    let bytes = data
                        .get(offset + 1..offset + 3)
                        .ok_or(TlvError::Truncated { offset })?;
                    offset += 3;
                    u16::from_be_bytes([bytes[0], bytes[1]]) as usize
                }
                Some(&len) => {
                    offset += 1;
                    len as usize
                }
                None => return Err(TlvError::Truncated { offset }),
            };

            let value = data
                .get(offset..offset + len)
                .ok_or(TlvError::Truncated { offset })?;
            offset += len;

            match Tag::from_code(code) {
                Some(tag) => elements.push(Self::new(tag, Bytes::copy_from_slice(value))),
                None => trace!(code, len, "Skipping unknown tag"),
            }
        }

        Ok(elements)
    }
}
