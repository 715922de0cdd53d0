//! Reader snapshots reported by the PC/SC service

use pcsc::{ReaderState, State};

/// What the reader reports about its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardPresence {
    /// No card in the field
    Empty,
    /// A card is in the field and free
    Present,
    /// A card is in the field and another application holds it exclusively
    Exclusive,
}

/// A reader and the card in its field, if any
#[derive(Debug, Clone)]
pub struct PcscReader {
    name: String,
    presence: CardPresence,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Snapshot of a reader whose state could not be queried
    pub(crate) const fn unknown(name: String) -> Self {
        Self {
            name,
            presence: CardPresence::Empty,
            atr: None,
        }
    }

    pub(crate) fn from_reader_state(state: &ReaderState) -> Self {
        let flags = state.event_state();
        let presence = if !flags.contains(State::PRESENT) || flags.contains(State::EMPTY) {
            CardPresence::Empty
        } else if flags.contains(State::EXCLUSIVE) {
            CardPresence::Exclusive
        } else {
            CardPresence::Present
        };

        Self {
            name: state.name().to_string_lossy().into_owned(),
            presence,
            atr: (presence != CardPresence::Empty).then(|| state.atr().to_vec()),
        }
    }

    /// Reader name as registered with the PC/SC service
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Card state of the slot
    pub const fn presence(&self) -> CardPresence {
        self.presence
    }

    /// Whether a card can be opened on this reader
    pub fn has_card(&self) -> bool {
        self.presence == CardPresence::Present
    }

    /// Answer to reset of the card in the field
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    /// Whether the card was reached over the contactless interface
    pub fn is_contactless(&self) -> bool {
        self.atr.as_deref().is_some_and(is_contactless_atr)
    }
}

/// Readers synthesise `3B 8n 80 01 ...` for ISO 14443 cards (PC/SC part 3)
fn is_contactless_atr(atr: &[u8]) -> bool {
    matches!(atr, [0x3B, t0, 0x80, 0x01, ..] if t0 & 0xF0 == 0x80)
}
