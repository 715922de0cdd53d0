//! Error type for TLV encoding and decoding

use super::{Tag, ValueKind};

/// TLV encoding or decoding failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    /// A required tag is absent from decoded data
    #[error("Missing tag {0}")]
    MissingTag(Tag),

    /// A tag is present but its bytes do not fit the tag's value kind
    #[error("Malformed value for tag {tag}: {reason}")]
    MalformedValue {
        /// Offending tag
        tag: Tag,
        /// What was wrong
        reason: &'static str,
    },

    /// A value was requested as a type the tag cannot carry
    #[error("Tag {tag} carries {expected:?} values")]
    UnexpectedKind {
        /// Offending tag
        tag: Tag,
        /// Kind declared for the tag
        expected: ValueKind,
    },

    /// Input ended in the middle of an element
    #[error("Truncated TLV data at offset {offset}")]
    Truncated {
        /// Byte offset where parsing stopped
        offset: usize,
    },

    /// A required value was not supplied to the builder
    #[error("Missing required value for tag {0}")]
    MissingRequiredValue(Tag),

    /// A value could not be rendered for its tag
    #[error("Cannot encode value for tag {tag}: {reason}")]
    UnencodableValue {
        /// Offending tag
        tag: Tag,
        /// What was wrong
        reason: &'static str,
    },

    /// A value exceeds the maximum encodable length
    #[error("Value for tag {tag} is {len} bytes long")]
    ValueTooLong {
        /// Offending tag
        tag: Tag,
        /// Value length
        len: usize,
    },
}

impl TlvError {
    /// Whether the error was raised while building a payload rather than reading one
    pub const fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredValue(_)
                | Self::UnencodableValue { .. }
                | Self::ValueTooLong { .. }
        )
    }

    /// Tag the error refers to, if any
    pub const fn tag(&self) -> Option<Tag> {
        match self {
            Self::MissingTag(tag)
            | Self::MissingRequiredValue(tag)
            | Self::MalformedValue { tag, .. }
            | Self::UnexpectedKind { tag, .. }
            | Self::UnencodableValue { tag, .. }
            | Self::ValueTooLong { tag, .. } => Some(*tag),
            Self::Truncated { .. } => None,
        }
    }
}
