use std::time::Duration;

use cardwallet_apdu_core::{
    EncryptionError, ResponseError, StatusKind, StatusWord, TlvError, TransportError,
};

/// Result type for card operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which stage of a command lifecycle produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ErrorCategory {
    /// Card is not eligible; nothing was sent
    #[display("pre-check")]
    PreCheck,
    /// Request could not be built
    #[display("serialize")]
    Serialize,
    /// The link to the card failed
    #[display("transport")]
    Transport,
    /// The card reported a failure
    #[display("card status")]
    CardStatus,
    /// The response could not be decoded
    #[display("decode")]
    Decode,
    /// The card answered but its proof did not verify
    #[display("verification")]
    Verification,
    /// Session level outcome
    #[display("session")]
    Session,
}

/// Error type for card operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Pre-check
    /// The card has no issuer data
    #[error("Card is not personalized")]
    NotPersonalized,

    /// The issuer has not activated the card
    #[error("Card is not activated")]
    NotActivated,

    /// No wallet matches the request
    #[error("Wallet not found")]
    WalletNotFound,

    /// The slot already holds or held a key
    #[error("Wallet is already created")]
    WalletAlreadyCreated,

    /// No free slot is left
    #[error("All wallet slots are in use")]
    MaxWalletsCreated,

    /// Card or wallet settings forbid purging
    #[error("Purging this wallet is prohibited")]
    PurgeWalletProhibited,

    /// The card holds wallets or forbids backup
    #[error("Backup cannot be created for this card")]
    BackupCannotBeCreated,

    /// The wallet curve cannot serve this operation
    #[error("Curve is not supported for this operation")]
    UnsupportedCurve,

    /// Card type or firmware rejected by the permanent filter
    #[error("Card type is not allowed: {0}")]
    WrongCardType(String),

    /// Card rejected by the batch, manufacturer or pluggable filter
    #[error("Card rejected by filter: {0}")]
    FilterRejected(String),

    /// Caller input is unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    // Serialize
    /// The command needs card data the session has not read
    #[error("Card must be read before this command")]
    MissingPreflightRead,

    /// Encryption is on but no session key is held
    #[error("Encryption key is missing")]
    MissingEncryptionKey,

    /// A value the request needs has not been resolved
    #[error("Missing context: {0}")]
    MissingContext(&'static str),

    // Transport
    /// Transport failure that is not retried
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reconnecting failed after the configured attempts
    #[error("Connection to the card was lost")]
    ConnectionLost,

    /// The card kept reporting a security delay
    #[error("Security delay did not finish after {attempts} attempts")]
    SecurityDelayTimeout {
        /// Delay responses tolerated
        attempts: u32,
    },

    // Card status
    /// The card rejected the access code
    #[error("Wrong access code")]
    WrongAccessCode,

    /// The card rejected the passcode
    #[error("Wrong passcode")]
    WrongPasscode,

    /// The holder cancelled on the card
    #[error("Cancelled on the card")]
    UserCancelled,

    /// The card asks for a pause before the next command
    #[error("Card requires a pause before retrying")]
    NeedPause {
        /// Pause requested by the card
        pause: Option<Duration>,
    },

    /// The card refuses plain payloads
    #[error("Card requires an encrypted session")]
    NeedEncryption,

    /// Any other status word
    #[error("Card error: {status}")]
    CardStatus {
        /// Raw status word
        status: StatusWord,
    },

    // Decode
    /// Malformed or missing TLV field
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// Malformed response frame
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Payload could not be decrypted
    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    /// The response came from another card
    #[error("Card id mismatch: expected {expected}, got {actual}")]
    WrongCardNumber {
        /// Card id held by the session
        expected: String,
        /// Card id in the response
        actual: String,
    },

    /// The card reported a backup status that does not fit the request
    #[error("Invalid backup status {raw}")]
    InvalidBackupStatus {
        /// Raw status code
        raw: u8,
    },

    // Verification
    /// A signature returned by the card does not verify
    #[error("Card verification failed")]
    CardVerificationFailed,

    /// Local crypto failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    // Session
    /// Cancelled through the session token or a declined prompt
    #[error("Operation cancelled")]
    Cancelled,

    /// Another command is already running on the session
    #[error("Session is busy")]
    Busy,
}

impl Error {
    /// Map a non-success status word to the error it stands for
    pub(crate) const fn from_status(status: StatusWord, pause: Option<Duration>) -> Self {
        match status.kind() {
            StatusKind::WrongAccessCode => Self::WrongAccessCode,
            StatusKind::WrongPasscode => Self::WrongPasscode,
            StatusKind::UserCancelled => Self::UserCancelled,
            StatusKind::NeedPause => Self::NeedPause { pause },
            StatusKind::NeedEncryption => Self::NeedEncryption,
            StatusKind::WalletNotFound => Self::WalletNotFound,
            _ => Self::CardStatus { status },
        }
    }

    /// Category of the error within the command lifecycle
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotPersonalized
            | Self::NotActivated
            | Self::WalletNotFound
            | Self::WalletAlreadyCreated
            | Self::MaxWalletsCreated
            | Self::PurgeWalletProhibited
            | Self::BackupCannotBeCreated
            | Self::UnsupportedCurve
            | Self::WrongCardType(_)
            | Self::FilterRejected(_)
            | Self::InvalidArgument(_) => ErrorCategory::PreCheck,

            Self::MissingPreflightRead | Self::MissingEncryptionKey | Self::MissingContext(_) => {
                ErrorCategory::Serialize
            }
            Self::Tlv(e) if e.is_build_error() => ErrorCategory::Serialize,
            Self::Encryption(EncryptionError::MissingKey | EncryptionError::Pad) => {
                ErrorCategory::Serialize
            }

            Self::Transport(_) | Self::ConnectionLost | Self::SecurityDelayTimeout { .. } => {
                ErrorCategory::Transport
            }

            Self::WrongAccessCode
            | Self::WrongPasscode
            | Self::UserCancelled
            | Self::NeedPause { .. }
            | Self::NeedEncryption
            | Self::CardStatus { .. } => ErrorCategory::CardStatus,

            Self::Tlv(_)
            | Self::Response(_)
            | Self::Encryption(_)
            | Self::WrongCardNumber { .. }
            | Self::InvalidBackupStatus { .. } => ErrorCategory::Decode,

            Self::CardVerificationFailed | Self::Crypto(_) => ErrorCategory::Verification,

            Self::Cancelled | Self::Busy => ErrorCategory::Session,
        }
    }

    /// Whether the error was reported by the card itself and must not be retried
    pub const fn is_terminal_card_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::CardStatus)
    }
}

impl From<cardwallet_apdu_core::Error> for Error {
    fn from(error: cardwallet_apdu_core::Error) -> Self {
        match error {
            cardwallet_apdu_core::Error::Tlv(e) => Self::Tlv(e),
            cardwallet_apdu_core::Error::Response(e) => Self::Response(e),
            cardwallet_apdu_core::Error::Encryption(e) => Self::Encryption(e),
            cardwallet_apdu_core::Error::Transport(e) => Self::Transport(e),
        }
    }
}
