//! Typed TLV payload decoder

use std::collections::HashMap;

use bytes::Bytes;

use super::{FromTlv, Tag, Tlv, TlvError, TlvValue, ValueKind};

/// Decodes typed values out of a TLV payload
///
/// A repeated tag keeps its last occurrence for [`decode`](Self::decode); every
/// occurrence stays available through [`decode_all`](Self::decode_all).
#[derive(Debug, Clone, Default)]
pub struct TlvDecoder {
    elements: Vec<Tlv>,
    latest: HashMap<Tag, Bytes>,
}

impl TlvDecoder {
    /// Parse a payload
    pub fn new(data: &[u8]) -> Result<Self, TlvError> {
        Ok(Self::from_elements(Tlv::parse_all(data)?))
    }

    /// Build a decoder over already parsed elements
    pub fn from_elements(elements: Vec<Tlv>) -> Self {
        let latest = elements
            .iter()
            .map(|tlv| (tlv.tag(), tlv.value().clone()))
            .collect();
        Self { elements, latest }
    }

    /// Elements in wire order
    pub fn elements(&self) -> &[Tlv] {
        &self.elements
    }

    /// Whether `tag` occurs in the payload
    pub fn contains(&self, tag: Tag) -> bool {
        self.latest.contains_key(&tag)
    }

    /// Decode a required value
    ///
    /// A missing presence-kind tag decodes as `false` rather than failing.
    pub fn decode<T: FromTlv>(&self, tag: Tag) -> Result<T, TlvError> {
        match self.latest.get(&tag) {
            Some(raw) => T::from_tlv(tag, TlvValue::decode(tag, raw)?),
            None if tag.kind() == ValueKind::Presence => {
                T::from_tlv(tag, TlvValue::Presence(false))
            }
            None => Err(TlvError::MissingTag(tag)),
        }
    }

    /// Decode an optional value
    pub fn decode_optional<T: FromTlv>(&self, tag: Tag) -> Result<Option<T>, TlvError> {
        self.latest
            .get(&tag)
            .map(|raw| T::from_tlv(tag, TlvValue::decode(tag, raw)?))
            .transpose()
    }

    /// Decode every occurrence of `tag`, in wire order
    pub fn decode_all<T: FromTlv>(&self, tag: Tag) -> Result<Vec<T>, TlvError> {
        self.elements
            .iter()
            .filter(|tlv| tlv.tag() == tag)
            .map(|tlv| T::from_tlv(tag, TlvValue::decode(tag, tlv.value())?))
            .collect()
    }
}

impl FromTlv for TlvDecoder {
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        match value {
            TlvValue::Nested(elements) => Ok(Self::from_elements(elements)),
            _ => Err(TlvError::UnexpectedKind {
                tag,
                expected: tag.kind(),
            }),
        }
    }
}
