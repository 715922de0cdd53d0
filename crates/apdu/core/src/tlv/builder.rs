//! Ordered TLV payload builder

use bytes::Bytes;

use super::{IntoTlv, Tag, Tlv, TlvError, ValueKind};

/// Builds a TLV payload in append order
///
/// Card firmware validates tag order for some commands, so elements are never
/// re-sorted.
///
/// In legacy mode the access code and passcode are written as bare [`Tag::Pin`] and
/// [`Tag::Pin2`] elements. Otherwise each is wrapped in a [`Tag::Authorization`]
/// container holding the same element.
#[derive(Debug, Clone, Default)]
pub struct TlvBuilder {
    legacy_mode: bool,
    elements: Vec<Tlv>,
}

impl TlvBuilder {
    /// Create an empty builder
    pub const fn new(legacy_mode: bool) -> Self {
        Self {
            legacy_mode,
            elements: Vec::new(),
        }
    }

    /// Whether legacy rendering is active
    pub const fn legacy_mode(&self) -> bool {
        self.legacy_mode
    }

    /// Append a value
    pub fn append<V: IntoTlv>(mut self, tag: Tag, value: V) -> Result<Self, TlvError> {
        let value = value.into_tlv(tag)?;
        self.push(tag, value)?;
        Ok(self)
    }

    /// Append a value when present; absent values are skipped
    pub fn append_optional<V: IntoTlv>(self, tag: Tag, value: Option<V>) -> Result<Self, TlvError> {
        match value {
            Some(value) => self.append(tag, value),
            None => Ok(self),
        }
    }

    /// Append a value that must be present
    pub fn append_required<V: IntoTlv>(self, tag: Tag, value: Option<V>) -> Result<Self, TlvError> {
        match value {
            Some(value) => self.append(tag, value),
            None => Err(TlvError::MissingRequiredValue(tag)),
        }
    }

    /// Append a nested payload built by another builder
    pub fn append_nested(self, tag: Tag, nested: Self) -> Result<Self, TlvError> {
        if tag.kind() != ValueKind::Nested {
            return Err(TlvError::UnexpectedKind {
                tag,
                expected: tag.kind(),
            });
        }
        let value = nested.serialize()?;
        self.append(tag, value)
    }

    /// Elements appended so far
    pub fn elements(&self) -> &[Tlv] {
        &self.elements
    }

    /// Serialize all elements in append order
    pub fn serialize(&self) -> Result<Bytes, TlvError> {
        Tlv::encode_all(&self.elements)
    }

    fn push(&mut self, tag: Tag, value: Bytes) -> Result<(), TlvError> {
        let element = Tlv::new(tag, value);
        if matches!(tag, Tag::Pin | Tag::Pin2) && !self.legacy_mode {
            let container = Tlv::encode_all(std::slice::from_ref(&element))?;
            self.elements.push(Tlv::new(Tag::Authorization, container));
        } else {
            self.elements.push(element);
        }
        Ok(())
    }
}
