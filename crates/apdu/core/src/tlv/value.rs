//! Typed TLV values and the conversions in and out of them

use bytes::Bytes;

use super::{Tag, Tlv, TlvError, ValueKind};

/// A TLV value decoded according to its tag's [`ValueKind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvValue {
    /// Opaque bytes
    Bytes(Bytes),
    /// Uppercase hex rendering of the raw bytes
    Hex(String),
    /// UTF-8 text
    Utf8(String),
    /// Unsigned integer
    Uint(u64),
    /// Presence flag
    Presence(bool),
    /// Curve name
    Curve(String),
    /// Nested elements
    Nested(Vec<Tlv>),
}

impl TlvValue {
    /// Decode raw bytes as the kind declared for `tag`
    pub fn decode(tag: Tag, raw: &Bytes) -> Result<Self, TlvError> {
        match tag.kind() {
            ValueKind::Bytes => Ok(Self::Bytes(raw.clone())),
            ValueKind::Hex => Ok(Self::Hex(hex::encode_upper(raw))),
            ValueKind::Utf8 => decode_utf8(tag, raw).map(Self::Utf8),
            ValueKind::Curve => decode_utf8(tag, raw).map(Self::Curve),
            ValueKind::Uint { width } => {
                if raw.is_empty() || raw.len() > width as usize {
                    return Err(TlvError::MalformedValue {
                        tag,
                        reason: "integer width mismatch",
                    });
                }
                Ok(Self::Uint(
                    raw.iter().fold(0u64, |acc, byte| (acc << 8) | *byte as u64),
                ))
            }
            ValueKind::Presence => match raw.as_ref() {
                [] => Ok(Self::Presence(true)),
                [flag] => Ok(Self::Presence(*flag != 0)),
                _ => Err(TlvError::MalformedValue {
                    tag,
                    reason: "presence flag longer than one byte",
                }),
            },
            ValueKind::Nested => Tlv::parse_all(raw).map(Self::Nested),
        }
    }
}

// Values may carry a trailing NUL from fixed-size card buffers.
fn decode_utf8(tag: Tag, raw: &[u8]) -> Result<String, TlvError> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::to_owned)
        .map_err(|_| TlvError::MalformedValue {
            tag,
            reason: "invalid UTF-8",
        })
}

/// Types that can be read out of a decoded TLV value
pub trait FromTlv: Sized {
    /// Convert the decoded value of `tag`
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError>;
}

/// Types that can be rendered as the value of a tag
pub trait IntoTlv {
    /// Render `self` as the raw value bytes of `tag`
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError>;
}

const fn unexpected(tag: Tag) -> TlvError {
    TlvError::UnexpectedKind {
        tag,
        expected: tag.kind(),
    }
}

impl FromTlv for TlvValue {
    fn from_tlv(_tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        Ok(value)
    }
}

impl FromTlv for Bytes {
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        match value {
            TlvValue::Bytes(bytes) => Ok(bytes),
            _ => Err(unexpected(tag)),
        }
    }
}

impl FromTlv for Vec<u8> {
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        Bytes::from_tlv(tag, value).map(|bytes| bytes.to_vec())
    }
}

impl FromTlv for String {
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        match value {
            TlvValue::Hex(text) | TlvValue::Utf8(text) | TlvValue::Curve(text) => Ok(text),
            _ => Err(unexpected(tag)),
        }
    }
}

impl FromTlv for bool {
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        match value {
            TlvValue::Presence(flag) => Ok(flag),
            _ => Err(unexpected(tag)),
        }
    }
}

impl FromTlv for Vec<Tlv> {
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        match value {
            TlvValue::Nested(elements) => Ok(elements),
            _ => Err(unexpected(tag)),
        }
    }
}

macro_rules! impl_uint {
    ($($ty:ty),+) => {$(
        impl FromTlv for $ty {
            fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
                match value {
                    TlvValue::Uint(value) => Self::try_from(value).map_err(|_| {
                        TlvError::MalformedValue { tag, reason: "integer out of range" }
                    }),
                    _ => Err(unexpected(tag)),
                }
            }
        }

        impl IntoTlv for $ty {
            fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
                encode_uint(tag, self as u64)
            }
        }
    )+};
}

impl_uint!(u8, u16, u32, u64, usize);

fn encode_uint(tag: Tag, value: u64) -> Result<Bytes, TlvError> {
    let ValueKind::Uint { width } = tag.kind() else {
        return Err(unexpected(tag));
    };

    let width = width as usize;
    if width < 8 && value >> (width * 8) != 0 {
        return Err(TlvError::UnencodableValue {
            tag,
            reason: "integer does not fit the tag width",
        });
    }

    Ok(Bytes::copy_from_slice(&value.to_be_bytes()[8 - width..]))
}

fn encode_raw(tag: Tag, bytes: Bytes) -> Result<Bytes, TlvError> {
    match tag.kind() {
        ValueKind::Bytes | ValueKind::Hex | ValueKind::Nested => Ok(bytes),
        _ => Err(unexpected(tag)),
    }
}

impl IntoTlv for Bytes {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        encode_raw(tag, self)
    }
}

impl IntoTlv for &Bytes {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        encode_raw(tag, self.clone())
    }
}

impl IntoTlv for &[u8] {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        encode_raw(tag, Bytes::copy_from_slice(self))
    }
}

impl<const N: usize> IntoTlv for &[u8; N] {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        encode_raw(tag, Bytes::copy_from_slice(self))
    }
}

impl IntoTlv for Vec<u8> {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        encode_raw(tag, Bytes::from(self))
    }
}

impl IntoTlv for &str {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        match tag.kind() {
            ValueKind::Utf8 | ValueKind::Curve => Ok(Bytes::copy_from_slice(self.as_bytes())),
            ValueKind::Hex => hex::decode(self)
                .map(Bytes::from)
                .map_err(|_| TlvError::UnencodableValue {
                    tag,
                    reason: "invalid hex string",
                }),
            _ => Err(unexpected(tag)),
        }
    }
}

impl IntoTlv for &String {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        self.as_str().into_tlv(tag)
    }
}

impl IntoTlv for String {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        self.as_str().into_tlv(tag)
    }
}

impl IntoTlv for bool {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        match tag.kind() {
            ValueKind::Presence => Ok(Bytes::copy_from_slice(&[self as u8])),
            _ => Err(unexpected(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_width_is_enforced() {
        assert_eq!(7u32.into_tlv(Tag::WalletIndex).unwrap().as_ref(), &[0x07]);
        assert_eq!(
            0x0102u32.into_tlv(Tag::Pause).unwrap().as_ref(),
            &[0x01, 0x02]
        );
        assert!(matches!(
            300u32.into_tlv(Tag::WalletIndex),
            Err(TlvError::UnencodableValue { .. })
        ));
    }

    #[test]
    fn test_uint_decoding_accepts_narrower_values() {
        let value =
            TlvValue::decode(Tag::SettingsMask, &Bytes::from_static(&[0x12, 0x34])).unwrap();
        assert_eq!(value, TlvValue::Uint(0x1234));

        let err = TlvValue::decode(Tag::WalletIndex, &Bytes::from_static(&[0x00, 0x01]));
        assert!(matches!(err, Err(TlvError::MalformedValue { tag: Tag::WalletIndex, .. })));
    }

    #[test]
    fn test_hex_and_text_kinds() {
        let id = "CB79000000018201".into_tlv(Tag::CardId).unwrap();
        assert_eq!(id.len(), 8);
        assert_eq!(
            TlvValue::decode(Tag::CardId, &id).unwrap(),
            TlvValue::Hex("CB79000000018201".into())
        );

        let name =
            TlvValue::decode(Tag::ManufacturerName, &Bytes::from_static(b"TANGEM\0\0")).unwrap();
        assert_eq!(name, TlvValue::Utf8("TANGEM".into()));
    }

    #[test]
    fn test_kind_mismatch_is_reported() {
        assert!(matches!(
            "abc".into_tlv(Tag::Salt),
            Err(TlvError::UnexpectedKind { tag: Tag::Salt, .. })
        ));
        assert!(matches!(
            Bytes::from_tlv(Tag::WalletIndex, TlvValue::Uint(1)),
            Err(TlvError::UnexpectedKind { .. })
        ));
    }
}
