//! Status word definitions for response frames

use std::fmt;

use tracing::Level;

/// Status Word (SW1-SW2) from a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

/// What a status word means for the command in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Command completed
    Success,
    /// Card is waiting out a security delay; resend the same frame
    SecurityDelay,
    /// Card requires a pause before the command may be retried
    NeedPause,
    /// Access code rejected
    WrongAccessCode,
    /// Passcode rejected
    WrongPasscode,
    /// User cancelled the operation on the card
    UserCancelled,
    /// Card refuses plain payloads
    NeedEncryption,
    /// Parameters rejected
    InvalidParams,
    /// Card state does not allow the command
    InvalidState,
    /// Instruction not supported
    InsNotSupported,
    /// Card failed while processing
    ProcessingError,
    /// Referenced wallet does not exist
    WalletNotFound,
    /// Anything else
    Unknown,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Classify this status word
    pub const fn kind(&self) -> StatusKind {
        match self.to_u16() {
            0x9000..=0x9007 => StatusKind::Success,
            0x9789 => StatusKind::SecurityDelay,
            0x9788 => StatusKind::NeedPause,
            0x6AF1 => StatusKind::WrongAccessCode,
            0x6AF2 => StatusKind::WrongPasscode,
            0x6F01 => StatusKind::UserCancelled,
            0x6982 => StatusKind::NeedEncryption,
            0x6A86 => StatusKind::InvalidParams,
            0x6985 => StatusKind::InvalidState,
            0x6D00 => StatusKind::InsNotSupported,
            0x6286 => StatusKind::ProcessingError,
            0x6A88 => StatusKind::WalletNotFound,
            _ => StatusKind::Unknown,
        }
    }

    /// Check if this status word indicates success
    pub const fn is_success(&self) -> bool {
        matches!(self.kind(), StatusKind::Success)
    }

    /// Check if this status word reports a security delay in progress
    pub const fn is_security_delay(&self) -> bool {
        matches!(self.kind(), StatusKind::SecurityDelay)
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        match self.kind() {
            StatusKind::Success => Level::DEBUG,
            StatusKind::SecurityDelay | StatusKind::NeedPause => Level::INFO,
            _ => Level::WARN,
        }
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        match self.kind() {
            StatusKind::Success => "Success",
            StatusKind::SecurityDelay => "Security delay in progress",
            StatusKind::NeedPause => "Pause required before retry",
            StatusKind::WrongAccessCode => "Wrong access code",
            StatusKind::WrongPasscode => "Wrong passcode",
            StatusKind::UserCancelled => "Cancelled by user",
            StatusKind::NeedEncryption => "Encryption required",
            StatusKind::InvalidParams => "Invalid parameters",
            StatusKind::InvalidState => "Invalid card state",
            StatusKind::InsNotSupported => "Instruction not supported",
            StatusKind::ProcessingError => "Error processing command",
            StatusKind::WalletNotFound => "Wallet not found",
            StatusKind::Unknown => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Common status words
pub mod common {
    use super::StatusWord;

    /// Success (90 00)
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// Security delay in progress (97 89)
    pub const SECURITY_DELAY: StatusWord = StatusWord::new(0x97, 0x89);

    /// Pause required before retry (97 88)
    pub const NEED_PAUSE: StatusWord = StatusWord::new(0x97, 0x88);

    /// Wrong access code (6A F1)
    pub const WRONG_ACCESS_CODE: StatusWord = StatusWord::new(0x6A, 0xF1);

    /// Wrong passcode (6A F2)
    pub const WRONG_PASSCODE: StatusWord = StatusWord::new(0x6A, 0xF2);

    /// Cancelled by user (6F 01)
    pub const USER_CANCELLED: StatusWord = StatusWord::new(0x6F, 0x01);

    /// Encryption required (69 82)
    pub const NEED_ENCRYPTION: StatusWord = StatusWord::new(0x69, 0x82);

    /// Invalid card state (69 85)
    pub const INVALID_STATE: StatusWord = StatusWord::new(0x69, 0x85);

    /// Wallet not found (6A 88)
    pub const WALLET_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x88);
}
