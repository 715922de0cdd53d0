//! Connection options for a wallet card reader

use pcsc::{Protocols, ShareMode};

/// How a [`PcscTransport`](crate::PcscTransport) connects to its reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcscConfig {
    /// Keep other applications off the card for the life of the connection
    pub exclusive: bool,

    /// Reconnect once and resend when the reader reports a card reset
    pub reconnect_on_reset: bool,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            exclusive: false,
            reconnect_on_reset: true,
        }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the card exclusively
    pub const fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Set whether a reset card is reconnected transparently
    pub const fn with_reconnect_on_reset(mut self, reconnect: bool) -> Self {
        self.reconnect_on_reset = reconnect;
        self
    }

    pub(crate) const fn share_mode(&self) -> ShareMode {
        if self.exclusive {
            ShareMode::Exclusive
        } else {
            ShareMode::Shared
        }
    }

    /// Wallet cards speak T=1 over contactless readers; T=0 covers contact fallbacks
    pub(crate) fn protocols(&self) -> Protocols {
        Protocols::T0 | Protocols::T1
    }
}
