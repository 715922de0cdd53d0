//! Mutable state of one card session

use std::fmt;

use cardwallet_apdu_core::{EncryptionKey, EncryptionMode, TlvBuilder};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Card, Config, Error, KeyPair, Result};

/// Which user code a prompt is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum UserCodeType {
    /// Code that unlocks the card
    #[display("access code")]
    AccessCode,
    /// Code that authorises signing and wallet changes
    #[display("passcode")]
    Passcode,
}

impl UserCodeType {
    /// Factory default value
    pub const fn default_value(self) -> &'static str {
        match self {
            Self::AccessCode => "000000",
            Self::Passcode => "000",
        }
    }
}

/// A user code, kept only as its SHA-256 hash
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct UserCode {
    #[zeroize(skip)]
    kind: UserCodeType,
    hash: [u8; 32],
}

impl fmt::Debug for UserCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCode")
            .field("kind", &self.kind)
            .field("is_default", &self.is_default())
            .finish()
    }
}

impl UserCode {
    /// Hash a plaintext code
    pub fn new(kind: UserCodeType, code: &str) -> Self {
        Self {
            kind,
            hash: Sha256::digest(code.as_bytes()).into(),
        }
    }

    /// Factory default code
    pub fn default_for(kind: UserCodeType) -> Self {
        Self::new(kind, kind.default_value())
    }

    /// Which code this is
    pub const fn kind(&self) -> UserCodeType {
        self.kind
    }

    /// SHA-256 of the code
    pub const fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Whether this is the factory default
    pub fn is_default(&self) -> bool {
        *self == Self::default_for(self.kind)
    }
}

/// State shared by the commands of one session
///
/// Owned by the session; commands read it while serializing and update it only
/// after a response was decoded and verified.
#[derive(Debug)]
pub struct SessionEnvironment {
    /// Card snapshot, absent until the first read
    pub card: Option<Card>,
    /// Session configuration
    pub config: Config,
    access_code: Option<UserCode>,
    passcode: Option<UserCode>,
    /// Card verification code, kept in the clear
    pub cvc: Option<String>,
    /// Linked terminal keys
    pub terminal_keys: Option<KeyPair>,
    pub(crate) encryption_mode: EncryptionMode,
    encryption_key: Option<EncryptionKey>,
}

impl SessionEnvironment {
    /// Environment holding the factory default codes
    pub fn new(config: Config) -> Self {
        Self {
            card: None,
            encryption_mode: config.encryption_mode,
            config,
            access_code: Some(UserCode::default_for(UserCodeType::AccessCode)),
            passcode: Some(UserCode::default_for(UserCodeType::Passcode)),
            cvc: None,
            terminal_keys: None,
            encryption_key: None,
        }
    }

    /// Card snapshot or [`Error::MissingPreflightRead`]
    pub fn card(&self) -> Result<&Card> {
        self.card.as_ref().ok_or(Error::MissingPreflightRead)
    }

    /// Mutable card snapshot or [`Error::MissingPreflightRead`]
    pub fn card_mut(&mut self) -> Result<&mut Card> {
        self.card.as_mut().ok_or(Error::MissingPreflightRead)
    }

    /// Whether user codes are rendered as bare TLV elements
    pub const fn legacy_mode(&self) -> bool {
        self.config.legacy_mode
    }

    /// Builder honouring the session's legacy mode
    pub const fn tlv_builder(&self) -> TlvBuilder {
        TlvBuilder::new(self.config.legacy_mode)
    }

    /// Negotiated payload encryption
    pub const fn encryption_mode(&self) -> EncryptionMode {
        self.encryption_mode
    }

    /// Session key, held once a session is opened
    pub const fn encryption_key(&self) -> Option<&EncryptionKey> {
        self.encryption_key.as_ref()
    }

    pub(crate) fn set_encryption_key(&mut self, key: Option<EncryptionKey>) {
        self.encryption_key = key;
    }

    /// Stored code of `kind`
    pub const fn user_code(&self, kind: UserCodeType) -> Option<&UserCode> {
        match kind {
            UserCodeType::AccessCode => self.access_code.as_ref(),
            UserCodeType::Passcode => self.passcode.as_ref(),
        }
    }

    /// Hash of the stored code of `kind`
    pub(crate) fn user_code_hash(&self, kind: UserCodeType) -> Result<&[u8; 32]> {
        self.user_code(kind)
            .map(UserCode::hash)
            .ok_or(Error::MissingContext(match kind {
                UserCodeType::AccessCode => "access code",
                UserCodeType::Passcode => "passcode",
            }))
    }

    /// Hash and store a code
    pub fn set_user_code(&mut self, kind: UserCodeType, code: &str) {
        let code = Some(UserCode::new(kind, code));
        match kind {
            UserCodeType::AccessCode => self.access_code = code,
            UserCodeType::Passcode => self.passcode = code,
        }
    }

    /// Forget a code so it is requested again when needed
    pub fn clear_user_code(&mut self, kind: UserCodeType) {
        match kind {
            UserCodeType::AccessCode => self.access_code = None,
            UserCodeType::Passcode => self.passcode = None,
        }
    }
}
