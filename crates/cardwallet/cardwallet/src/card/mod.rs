//! Card and wallet state model
//!
//! A [`Card`] is the snapshot the session keeps of the physical card. Commands
//! update it only after their response was decoded and verified.

mod backup;
mod curve;
mod firmware;
mod settings;
mod wallet;

pub use backup::{BackupRawStatus, BackupStatus};
use bytes::Bytes;
pub use curve::{EllipticCurve, UnknownCurve};
pub use firmware::{FirmwareType, FirmwareVersion, InvalidFirmwareVersion};
use serde::{Deserialize, Serialize};
pub use settings::CardSettings;
pub use wallet::{CardWallet, ExtendedPublicKey, WalletIndex, WalletStatus};

use crate::{Error, Result};

/// Lifecycle status of the card
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum CardStatus {
    /// Factory state, no issuer data yet
    NotPersonalized = 0,
    /// Personalized, no wallet created
    Empty = 1,
    /// At least one wallet holds a key
    Loaded = 2,
    /// The wallet was purged and cannot be recreated
    Purged = 3,
}

impl TryFrom<u8> for CardStatus {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::NotPersonalized),
            1 => Ok(Self::Empty),
            2 => Ok(Self::Loaded),
            3 => Ok(Self::Purged),
            _ => Err(cardwallet_apdu_core::TlvError::MalformedValue {
                tag: cardwallet_apdu_core::Tag::Status,
                reason: "unknown status",
            }
            .into()),
        }
    }
}

/// Snapshot of a card as read during a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Unique card number; fixed once read
    pub card_id: String,
    /// Manufacturer as reported by the card
    pub manufacturer_name: String,
    /// Firmware version and build flavour
    pub firmware_version: FirmwareVersion,
    /// Key the card signs its own attestations with
    #[serde(with = "hex_bytes")]
    pub card_public_key: Bytes,
    /// Issuer key, absent on cards read before personalization
    #[serde(with = "hex_bytes::option", default)]
    pub issuer_public_key: Option<Bytes>,
    /// Card-wide settings mask
    pub settings: CardSettings,
    /// Lifecycle status
    pub status: CardStatus,
    /// Card-wide curve, set on cards with a single wallet
    pub curve: Option<EllipticCurve>,
    /// Card still awaits activation by its issuer
    pub activation_pending: bool,
    /// Card health, 0 is healthy
    pub health: Option<u8>,
    /// Number of wallet slots
    pub wallets_count: Option<u32>,
    /// Backup state, absent on firmware without backup
    pub backup_status: Option<BackupStatus>,
    /// Wallets in card order, unique by public key
    pub wallets: Vec<CardWallet>,
    /// Whether the wallet list has been read
    #[serde(skip)]
    pub(crate) full_read: bool,
}

impl Card {
    /// Wallet addressed by `index`
    pub fn wallet(&self, index: &WalletIndex) -> Option<&CardWallet> {
        self.wallets.iter().find(|wallet| wallet.matches(index))
    }

    /// Mutable wallet addressed by `index`
    pub fn wallet_mut(&mut self, index: &WalletIndex) -> Option<&mut CardWallet> {
        self.wallets.iter_mut().find(|wallet| wallet.matches(index))
    }

    /// Whether the wallet list is known
    pub const fn is_fully_read(&self) -> bool {
        self.full_read
    }

    /// Whether any slot holds or held a key
    pub fn has_created_wallets(&self) -> bool {
        self.wallets.iter().any(CardWallet::is_created)
    }

    /// Number of slots, one for cards without multi-wallet support
    pub fn slot_count(&self) -> u32 {
        if self.firmware_version.is_multi_wallet() {
            self.wallets_count.unwrap_or(1)
        } else {
            1
        }
    }

    /// Lowest slot that holds no wallet
    pub fn first_empty_slot(&self) -> Option<u32> {
        (0..self.slot_count()).find(|index| {
            self.wallet(&WalletIndex::Index(*index))
                .is_none_or(|wallet| !wallet.is_created())
        })
    }

    /// Insert a wallet or update the wallet at the same index in place
    ///
    /// A different slot already holding the same public key loses it, so keys stay
    /// unique.
    pub fn upsert_wallet(&mut self, wallet: CardWallet) {
        if let Some(key) = &wallet.public_key {
            self.wallets.retain(|existing| {
                existing.index == wallet.index || existing.public_key.as_ref() != Some(key)
            });
        }

        match self.wallets.iter_mut().find(|w| w.index == wallet.index) {
            Some(existing) => existing.merge(wallet),
            None => self.wallets.push(wallet),
        }
    }

    /// Replace the wallet list with what the card reported
    pub fn set_wallets(&mut self, wallets: Vec<CardWallet>) {
        let mut previous = std::mem::take(&mut self.wallets);
        for wallet in wallets {
            match previous.iter().position(|w| w.index == wallet.index) {
                Some(position) => {
                    let mut existing = previous.swap_remove(position);
                    existing.merge(wallet);
                    self.upsert_wallet(existing);
                }
                None => self.upsert_wallet(wallet),
            }
        }
        self.full_read = true;
    }

    /// Reset a slot to empty after a purge
    pub fn purge_wallet(&mut self, index: u32) {
        if let Some(wallet) = self.wallet_mut(&WalletIndex::Index(index)) {
            *wallet = wallet.empty_copy();
        }
    }
}

/// Serde helpers rendering bytes as uppercase hex
pub(crate) mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        bytes: &Bytes,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Bytes::from).map_err(serde::de::Error::custom)
    }

    pub(crate) mod option {
        use bytes::Bytes;
        use serde::{Deserialize, Deserializer, Serializer};

        pub(crate) fn serialize<S: Serializer>(
            bytes: &Option<Bytes>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => super::serialize(bytes, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Bytes>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| hex::decode(s).map(Bytes::from).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
