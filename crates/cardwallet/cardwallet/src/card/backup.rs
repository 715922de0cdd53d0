use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Backup status code as reported by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackupRawStatus {
    /// No backup cards
    NoBackup = 0,
    /// Backup cards are linked but not yet written
    CardLinked = 1,
    /// Backup cards hold the wallets
    Active = 2,
}

impl TryFrom<u8> for BackupRawStatus {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::NoBackup),
            1 => Ok(Self::CardLinked),
            2 => Ok(Self::Active),
            _ => Err(Error::InvalidBackupStatus { raw }),
        }
    }
}

/// Backup status of an origin card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BackupStatus {
    /// No backup relationship
    NoBackup,
    /// Backup cards are linked but the backup is not finalized
    #[serde(rename_all = "camelCase")]
    CardLinked { cards_count: usize },
    /// Backup is complete
    #[serde(rename_all = "camelCase")]
    Active { cards_count: usize },
}

impl BackupStatus {
    /// Interpret a raw status together with the number of backup cards
    ///
    /// A linked or active status needs a card count.
    pub fn from_raw(raw: BackupRawStatus, cards_count: Option<usize>) -> Result<Self> {
        match (raw, cards_count) {
            (BackupRawStatus::NoBackup, _) => Ok(Self::NoBackup),
            (BackupRawStatus::CardLinked, Some(cards_count)) => {
                Ok(Self::CardLinked { cards_count })
            }
            (BackupRawStatus::Active, Some(cards_count)) => Ok(Self::Active { cards_count }),
            (raw, None) => Err(Error::InvalidBackupStatus { raw: raw as u8 }),
        }
    }

    /// Number of linked backup cards
    pub const fn cards_count(&self) -> usize {
        match self {
            Self::NoBackup => 0,
            Self::CardLinked { cards_count } | Self::Active { cards_count } => *cards_count,
        }
    }

    /// Whether backup cards hold the wallets
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}
