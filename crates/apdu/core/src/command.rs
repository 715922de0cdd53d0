//! Command frames
//!
//! A command frame carries a fixed class byte, the instruction of the command, the
//! payload encryption mode in P1 and the TLV payload. Payloads above 255 bytes use
//! the extended length form.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::encryption::{EncryptionError, EncryptionKey, EncryptionMode};

/// Class byte used by every command
pub const CLA: u8 = 0x00;

/// Instruction codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Instruction {
    /// Read the card
    Read = 0xF2,
    /// Read a single wallet
    ReadWallet = 0xE5,
    /// Read the list of wallets
    ReadWalletsList = 0xE4,
    /// Create a wallet
    CreateWallet = 0xF8,
    /// Purge a wallet
    PurgeWallet = 0xFC,
    /// Sign hashes with a wallet
    Sign = 0xFB,
    /// Prove possession of a wallet key; shared by check and attest
    AttestWalletKey = 0xF9,
    /// Link backup cards to an origin card
    LinkOriginCard = 0xE8,
    /// Negotiate a session encryption key
    OpenSession = 0xFF,
}

impl Instruction {
    /// Instruction byte
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up an instruction by its byte
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0xF2 => Self::Read,
            0xE5 => Self::ReadWallet,
            0xE4 => Self::ReadWalletsList,
            0xF8 => Self::CreateWallet,
            0xFC => Self::PurgeWallet,
            0xFB => Self::Sign,
            0xF9 => Self::AttestWalletKey,
            0xE8 => Self::LinkOriginCard,
            0xFF => Self::OpenSession,
            _ => return None,
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:02X})", self, self.code())
    }
}

/// A command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    /// Instruction
    pub ins: Instruction,
    /// First parameter, the payload encryption mode
    pub p1: u8,
    /// Second parameter
    pub p2: u8,
    /// TLV payload, encrypted once [`encrypt`](Self::encrypt) has run
    pub data: Bytes,
}

impl CommandApdu {
    /// Create an unencrypted frame
    pub const fn new(ins: Instruction, data: Bytes) -> Self {
        Self {
            ins,
            p1: EncryptionMode::None.code(),
            p2: 0x00,
            data,
        }
    }

    /// Set the encryption mode announced in P1
    pub const fn with_encryption_mode(mut self, mode: EncryptionMode) -> Self {
        self.p1 = mode.code();
        self
    }

    /// Encryption mode announced in P1
    pub const fn encryption_mode(&self) -> Option<EncryptionMode> {
        EncryptionMode::from_code(self.p1)
    }

    /// Encrypt the payload under `mode`
    ///
    /// With [`EncryptionMode::None`] the frame is returned unchanged. Any other mode
    /// requires a key.
    pub fn encrypt(
        self,
        mode: EncryptionMode,
        key: Option<&EncryptionKey>,
    ) -> Result<Self, EncryptionError> {
        if mode == EncryptionMode::None {
            return Ok(self.with_encryption_mode(mode));
        }

        let key = key.ok_or(EncryptionError::MissingKey)?;
        let data = key.encrypt(&self.data)?;
        Ok(Self { data, ..self }.with_encryption_mode(mode))
    }

    /// Serialize the frame
    pub fn to_bytes(&self) -> Bytes {
        let len = self.data.len();
        let extended = len > 0xFF;
        let mut buf = BytesMut::with_capacity(4 + 3 + len + 2);

        // Header: CLA, INS, P1, P2
        buf.put_u8(CLA);
        buf.put_u8(self.ins.code());
        buf.put_u8(self.p1);
        buf.put_u8(self.p2);

        if extended {
            buf.put_u8(0x00);
            buf.put_u16(len as u16);
        } else {
            buf.put_u8(len as u8);
        }
        buf.put_slice(&self.data);

        // Le: maximum response length
        if extended {
            buf.put_u16(0x0000);
        } else {
            buf.put_u8(0x00);
        }

        buf.freeze()
    }

    /// Parse a serialized frame
    ///
    /// Returns `None` when the bytes are not a well formed frame.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let [cla, ins, p1, p2, rest @ ..] = bytes else {
            return None;
        };
        if *cla != CLA {
            return None;
        }
        let ins = Instruction::from_code(*ins)?;

        let data = match rest {
            [0x00, hi, lo, tail @ ..] if tail.len() >= 2 => {
                let len = u16::from_be_bytes([*hi, *lo]) as usize;
                (tail.len() == len + 2).then(|| Bytes::copy_from_slice(&tail[..len]))?
            }
            [len, tail @ ..] => {
                let len = *len as usize;
                (tail.len() == len + 1).then(|| Bytes::copy_from_slice(&tail[..len]))?
            }
            [] => Bytes::new(),
        };

        Some(Self {
            ins,
            p1: *p1,
            p2: *p2,
            data,
        })
    }
}
