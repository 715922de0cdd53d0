use bytes::Bytes;
use cardwallet_apdu_core::{Tag, TlvDecoder};
use serde::{Deserialize, Serialize};

use super::{CardSettings, CardStatus, EllipticCurve, hex_bytes};
use crate::Result;

/// Status of a wallet slot
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum WalletStatus {
    /// No key in the slot
    Empty = 1,
    /// The slot holds a key
    Loaded = 2,
    /// The key was purged
    Purged = 3,
}

impl From<CardStatus> for WalletStatus {
    fn from(status: CardStatus) -> Self {
        match status {
            CardStatus::NotPersonalized | CardStatus::Empty => Self::Empty,
            CardStatus::Loaded => Self::Loaded,
            CardStatus::Purged => Self::Purged,
        }
    }
}

/// Addresses a wallet either by slot or by its public key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WalletIndex {
    /// Slot index
    Index(u32),
    /// Wallet public key
    PublicKey(Bytes),
}

impl From<u32> for WalletIndex {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl From<Bytes> for WalletIndex {
    fn from(public_key: Bytes) -> Self {
        Self::PublicKey(public_key)
    }
}

/// A derived child public key
///
/// Two keys are equal when their key bytes are equal, whatever the chain code.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedPublicKey {
    /// Child public key
    #[serde(with = "hex_bytes")]
    pub public_key: Bytes,
    /// BIP-32 chain code
    #[serde(with = "hex_bytes")]
    pub chain_code: Bytes,
}

impl ExtendedPublicKey {
    /// Pair a child key with its chain code
    pub const fn new(public_key: Bytes, chain_code: Bytes) -> Self {
        Self {
            public_key,
            chain_code,
        }
    }
}

impl PartialEq for ExtendedPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

/// A wallet slot on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardWallet {
    /// Slot index, stable for the life of the card
    pub index: u32,
    /// Slot status
    pub status: WalletStatus,
    /// Curve of the key, absent for empty slots
    pub curve: Option<EllipticCurve>,
    /// Wallet settings mask
    pub settings: Option<CardSettings>,
    /// Wallet public key, absent for empty slots
    #[serde(with = "hex_bytes::option", default)]
    pub public_key: Option<Bytes>,
    /// Total hashes signed by this wallet; never decreases
    pub signed_hashes: Option<u32>,
    /// Signatures left on firmware with a signing limit
    pub remaining_signatures: Option<u32>,
    /// Child keys derived so far, in first-seen order
    #[serde(default)]
    pub derived_keys: Vec<ExtendedPublicKey>,
}

impl CardWallet {
    /// An empty slot
    pub const fn empty(index: u32) -> Self {
        Self {
            index,
            status: WalletStatus::Empty,
            curve: None,
            settings: None,
            public_key: None,
            signed_hashes: None,
            remaining_signatures: None,
            derived_keys: Vec::new(),
        }
    }

    /// Copy of this slot after a purge
    pub const fn empty_copy(&self) -> Self {
        Self::empty(self.index)
    }

    /// Whether this slot holds or held a key
    pub const fn is_created(&self) -> bool {
        !matches!(self.status, WalletStatus::Empty)
    }

    /// Whether `index` addresses this wallet
    pub fn matches(&self, index: &WalletIndex) -> bool {
        match index {
            WalletIndex::Index(i) => self.index == *i,
            WalletIndex::PublicKey(key) => self.public_key.as_ref() == Some(key),
        }
    }

    /// Raise the signed-hash counter; lower values are ignored
    pub fn update_signed_hashes(&mut self, reported: Option<u32>) {
        self.signed_hashes = match (self.signed_hashes, reported) {
            (Some(current), Some(reported)) => Some(current.max(reported)),
            (current, reported) => current.or(reported),
        };
    }

    /// Record a derived key unless an equal key is already known
    ///
    /// Returns whether the key was added.
    pub fn add_derived_key(&mut self, key: ExtendedPublicKey) -> bool {
        if self.derived_keys.contains(&key) {
            return false;
        }
        self.derived_keys.push(key);
        true
    }

    /// Decode wallet fields from a wallet TLV set
    ///
    /// `index` is used when the payload carries no index of its own.
    pub(crate) fn decode(decoder: &TlvDecoder, index: Option<u32>) -> Result<Self> {
        let index = match decoder.decode_optional::<u32>(Tag::WalletIndex)? {
            Some(index) => index,
            None => index.ok_or(cardwallet_apdu_core::TlvError::MissingTag(Tag::WalletIndex))?,
        };
        let status = CardStatus::try_from(decoder.decode::<u8>(Tag::Status)?)?;

        Ok(Self {
            index,
            status: status.into(),
            curve: decoder.decode_optional(Tag::CurveId)?,
            settings: decoder
                .decode_optional::<u32>(Tag::SettingsMask)?
                .map(CardSettings),
            public_key: decoder.decode_optional(Tag::WalletPublicKey)?,
            signed_hashes: decoder.decode_optional(Tag::WalletSignedHashes)?,
            remaining_signatures: decoder.decode_optional(Tag::WalletRemainingSignatures)?,
            derived_keys: Vec::new(),
        })
    }

    /// Take fresh values from `other`, keeping derived keys and the highest counter
    pub(crate) fn merge(&mut self, other: Self) {
        let signed_hashes = other.signed_hashes;
        let same_key = self.public_key == other.public_key;
        let derived_keys = if same_key {
            std::mem::take(&mut self.derived_keys)
        } else {
            Vec::new()
        };
        let previous = if same_key { self.signed_hashes } else { None };

        *self = Self {
            derived_keys,
            signed_hashes: previous,
            ..other
        };
        self.update_signed_hashes(signed_hashes);
    }
}

#[cfg(test)]
mod tests {
    use cardwallet_apdu_core::TlvBuilder;

    use super::*;

    fn key(byte: u8) -> ExtendedPublicKey {
        ExtendedPublicKey::new(Bytes::from(vec![byte; 33]), Bytes::from(vec![0xCC; 32]))
    }

    #[test]
    fn test_derived_keys_deduplicate_by_key_bytes() {
        let mut wallet = CardWallet::empty(0);
        assert!(wallet.add_derived_key(key(1)));
        assert!(wallet.add_derived_key(key(2)));

        let mut same_key = key(1);
        same_key.chain_code = Bytes::from_static(&[0x00; 32]);
        assert!(!wallet.add_derived_key(same_key));

        assert_eq!(wallet.derived_keys, [key(1), key(2)]);
        assert_eq!(wallet.derived_keys[0].chain_code.as_ref(), &[0xCC; 32]);
    }

    #[test]
    fn test_signed_hashes_never_decrease() {
        let mut wallet = CardWallet::empty(0);
        wallet.update_signed_hashes(Some(10));
        wallet.update_signed_hashes(Some(4));
        wallet.update_signed_hashes(None);
        assert_eq!(wallet.signed_hashes, Some(10));
        wallet.update_signed_hashes(Some(11));
        assert_eq!(wallet.signed_hashes, Some(11));
    }

    #[test]
    fn test_merge_keeps_derived_keys_of_same_wallet() {
        let public_key = Bytes::from_static(&[0x04; 65]);
        let mut wallet = CardWallet {
            status: WalletStatus::Loaded,
            public_key: Some(public_key.clone()),
            signed_hashes: Some(7),
            ..CardWallet::empty(1)
        };
        wallet.add_derived_key(key(9));

        wallet.merge(CardWallet {
            status: WalletStatus::Loaded,
            public_key: Some(public_key),
            signed_hashes: Some(3),
            ..CardWallet::empty(1)
        });
        assert_eq!(wallet.signed_hashes, Some(7));
        assert_eq!(wallet.derived_keys.len(), 1);

        wallet.merge(CardWallet::empty(1));
        assert!(wallet.derived_keys.is_empty());
        assert_eq!(wallet.signed_hashes, None);
    }

    #[test]
    fn test_decode() {
        let payload = TlvBuilder::new(true)
            .append(Tag::WalletIndex, 2u32)
            .unwrap()
            .append(Tag::Status, 2u8)
            .unwrap()
            .append(Tag::CurveId, EllipticCurve::Secp256k1)
            .unwrap()
            .append(Tag::WalletPublicKey, &[0x02; 33])
            .unwrap()
            .serialize()
            .unwrap();
        let wallet = CardWallet::decode(&TlvDecoder::new(&payload).unwrap(), None).unwrap();
        assert_eq!(wallet.index, 2);
        assert_eq!(wallet.status, WalletStatus::Loaded);
        assert_eq!(wallet.curve, Some(EllipticCurve::Secp256k1));
        assert!(wallet.matches(&WalletIndex::PublicKey(Bytes::from_static(&[0x02; 33]))));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(WalletStatus::from(CardStatus::NotPersonalized), WalletStatus::Empty);
        assert_eq!(WalletStatus::from(CardStatus::Empty), WalletStatus::Empty);
        assert_eq!(WalletStatus::from(CardStatus::Purged), WalletStatus::Purged);
    }
}
