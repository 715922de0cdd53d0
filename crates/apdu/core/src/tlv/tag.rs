//! Tag set and the value kind each tag carries

use std::fmt;

/// Shape of a TLV value, fixed per tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    /// Opaque byte string
    Bytes,
    /// Byte string rendered as uppercase hex text
    Hex,
    /// UTF-8 text
    Utf8,
    /// Big-endian unsigned integer encoded in at most `width` bytes
    Uint {
        /// Encoded width in bytes
        width: u8,
    },
    /// Flag that is true when the tag is present
    Presence,
    /// Elliptic curve identifier, carried as its UTF-8 name
    Curve,
    /// A nested sequence of TLV elements
    Nested,
}

macro_rules! tags {
    ($(
        $(#[$meta:meta])*
        $name:ident = $code:literal => $kind:expr,
    )+) => {
        /// Tags understood by the card protocol
        ///
        /// The discriminant is the one-byte tag code on the wire.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum Tag {
            $(
                $(#[$meta])*
                $name = $code,
            )+
        }

        impl Tag {
            /// All known tags
            pub const ALL: &'static [Self] = &[$(Self::$name),+];

            /// Look up a tag by its wire code
            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)+
                    _ => None,
                }
            }

            /// Value kind expected for this tag
            pub const fn kind(self) -> ValueKind {
                match self {
                    $(Self::$name => $kind,)+
                }
            }

            /// Human readable tag name
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)+
                }
            }
        }
    };
}

use ValueKind::{Bytes, Curve, Hex, Nested, Presence, Utf8};

const fn uint(width: u8) -> ValueKind {
    ValueKind::Uint { width }
}

tags! {
    /// Card identifier (8 bytes, shown as hex)
    CardId = 0x01 => Hex,
    /// Card lifecycle status
    Status = 0x02 => uint(1),
    /// Card attestation public key
    CardPublicKey = 0x03 => Bytes,
    /// Curve of a wallet or of a legacy single-wallet card
    CurveId = 0x05 => Curve,
    /// Card or wallet settings bitmask
    SettingsMask = 0x0A => uint(4),
    /// Whether the card has been activated
    IsActivated = 0x0B => Presence,
    /// Card health counter
    Health = 0x0F => uint(1),
    /// Hash of the access code
    Pin = 0x10 => Bytes,
    /// Hash of the passcode
    Pin2 = 0x11 => Bytes,
    /// Replacement access code hash
    NewPin = 0x12 => Bytes,
    /// Replacement passcode hash
    NewPin2 = 0x13 => Bytes,
    /// Host challenge
    Challenge = 0x16 => Bytes,
    /// Card generated salt
    Salt = 0x17 => Bytes,
    /// Card verification code
    Cvc = 0x19 => Bytes,
    /// Host half of the session key agreement
    SessionKeyA = 0x1A => Bytes,
    /// Card half of the session key agreement
    SessionKeyB = 0x1B => Bytes,
    /// Remaining security delay, in units of 10 ms
    Pause = 0x1C => uint(2),
    /// Authorization container wrapping an access code or passcode tag
    Authorization = 0x1E => Nested,
    /// Manufacturer name
    ManufacturerName = 0x20 => Utf8,
    /// Position of a nested block in a list
    FileIndex = 0x26 => uint(1),
    /// Issuer public key
    IssuerPublicKey = 0x30 => Bytes,
    /// Concatenated hashes to sign
    TransactionOutHash = 0x50 => Bytes,
    /// Length of each hash to sign
    TransactionOutHashSize = 0x51 => uint(1),
    /// Linked terminal signature over the hashes to sign
    TerminalTransactionSignature = 0x57 => Bytes,
    /// Linked terminal public key
    TerminalPublicKey = 0x5C => Bytes,
    /// Wallet public key
    WalletPublicKey = 0x60 => Bytes,
    /// Signature produced with a wallet key
    WalletSignature = 0x61 => Bytes,
    /// Signatures left on a legacy single-wallet card
    WalletRemainingSignatures = 0x62 => uint(4),
    /// Number of hashes signed with a wallet
    WalletSignedHashes = 0x63 => uint(4),
    /// Attestation counter
    CheckWalletCounter = 0x64 => uint(4),
    /// Wallet slot index
    WalletIndex = 0x65 => uint(1),
    /// Number of wallet slots
    WalletsCount = 0x66 => uint(1),
    /// One wallet entry in a wallet list
    WalletInfo = 0x67 => Nested,
    /// Derivation path, big-endian 32-bit components
    WalletHdPath = 0x6A => Bytes,
    /// Chain code of a derived key
    WalletHdChain = 0x6B => Bytes,
    /// Card key signature over an attested wallet key
    CardSignature = 0x6C => Bytes,
    /// Challenge for the card key signature
    PublicKeyChallenge = 0x6D => Bytes,
    /// Salt for the card key signature
    PublicKeySalt = 0x6E => Bytes,
    /// Firmware version text
    FirmwareVersion = 0x80 => Utf8,
    /// Raw backup status
    BackupStatus = 0xD0 => uint(1),
    /// Number of linked backup cards
    BackupCount = 0xD1 => uint(1),
    /// Linking key of the origin card
    OriginCardLinkingKey = 0xD2 => Bytes,
    /// Linking key of a backup card
    BackupCardLinkingKey = 0xD3 => Bytes,
    /// One backup card block
    BackupCardLink = 0xD4 => Nested,
    /// Signature attesting the backup set
    BackupAttestSignature = 0xD5 => Bytes,
    /// Card certificate
    Certificate = 0xD6 => Bytes,
}

impl Tag {
    /// Wire code of this tag
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}
