//! Session configuration

use cardwallet_apdu_core::EncryptionMode;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    Error, Result,
    card::{Card, FirmwareType, FirmwareVersion},
    commands::PreflightReadMode,
};

/// Allow or deny list of string items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "items", rename_all = "camelCase")]
pub enum ItemFilter {
    /// Only the listed items pass
    Allow(Vec<String>),
    /// Everything but the listed items passes
    Deny(Vec<String>),
}

impl ItemFilter {
    /// Whether `item` passes the filter; comparison ignores ASCII case
    pub fn is_allowed(&self, item: &str) -> bool {
        let listed = |items: &[String]| items.iter().any(|i| i.eq_ignore_ascii_case(item));
        match self {
            Self::Allow(items) => listed(items),
            Self::Deny(items) => !listed(items),
        }
    }
}

/// Permanent verification applied to every card read in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CardFilter {
    /// Firmware build flavours accepted
    pub allowed_card_types: Vec<FirmwareType>,
    /// Batch filter, matched against the first four characters of the card id
    pub batch_ids: Option<ItemFilter>,
    /// Manufacturer filter
    pub manufacturer_names: Option<ItemFilter>,
    /// Newest firmware accepted
    pub max_firmware_version: Option<FirmwareVersion>,
}

impl Default for CardFilter {
    fn default() -> Self {
        Self {
            allowed_card_types: vec![
                FirmwareType::Sdk,
                FirmwareType::Release,
                FirmwareType::Special,
            ],
            batch_ids: None,
            manufacturer_names: None,
            max_firmware_version: None,
        }
    }
}

impl CardFilter {
    /// Check a freshly read card against the filter
    pub fn verify_card(&self, card: &Card) -> Result<()> {
        let kind = card.firmware_version.kind;
        if !self.allowed_card_types.contains(&kind) {
            warn!(card_id = %card.card_id, ?kind, "Card type not allowed");
            return Err(Error::WrongCardType(format!("{kind:?}")));
        }

        if let Some(filter) = &self.batch_ids {
            let batch = card.card_id.get(..4).unwrap_or(&card.card_id);
            if !filter.is_allowed(batch) {
                warn!(card_id = %card.card_id, batch, "Card batch rejected");
                return Err(Error::FilterRejected(format!("batch {batch}")));
            }
        }

        if let Some(filter) = &self.manufacturer_names {
            if !filter.is_allowed(&card.manufacturer_name) {
                warn!(
                    card_id = %card.card_id,
                    manufacturer = %card.manufacturer_name,
                    "Manufacturer rejected"
                );
                return Err(Error::FilterRejected(format!(
                    "manufacturer {}",
                    card.manufacturer_name
                )));
            }
        }

        if let Some(max) = self.max_firmware_version {
            if card.firmware_version > max {
                warn!(
                    card_id = %card.card_id,
                    firmware = %card.firmware_version,
                    "Firmware too new"
                );
                return Err(Error::WrongCardType(format!(
                    "firmware {} is newer than {max}",
                    card.firmware_version
                )));
            }
        }

        Ok(())
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Read mode used by callers that do not ask for one
    pub default_read_mode: PreflightReadMode,
    /// Payload encryption negotiated at session start
    pub encryption_mode: EncryptionMode,
    /// Render access code and passcode as bare elements
    pub legacy_mode: bool,
    /// Permanent card filter
    pub filter: CardFilter,
    /// Security delay responses tolerated for one command
    pub max_security_delay_attempts: u32,
    /// Link re-establishments tolerated for one command
    pub max_reconnect_attempts: u32,
    /// Pause before re-establishing the link, in milliseconds
    pub reconnect_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_read_mode: PreflightReadMode::FullCardRead,
            encryption_mode: EncryptionMode::None,
            legacy_mode: true,
            filter: CardFilter::default(),
            max_security_delay_attempts: 120,
            max_reconnect_attempts: 3,
            reconnect_delay_ms: 200,
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default read mode
    pub fn with_default_read_mode(mut self, mode: PreflightReadMode) -> Self {
        self.default_read_mode = mode;
        self
    }

    /// Set the encryption mode
    pub const fn with_encryption_mode(mut self, mode: EncryptionMode) -> Self {
        self.encryption_mode = mode;
        self
    }

    /// Set legacy TLV rendering
    pub const fn with_legacy_mode(mut self, legacy_mode: bool) -> Self {
        self.legacy_mode = legacy_mode;
        self
    }

    /// Set the card filter
    pub fn with_filter(mut self, filter: CardFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the security delay attempt ceiling
    pub const fn with_max_security_delay_attempts(mut self, attempts: u32) -> Self {
        self.max_security_delay_attempts = attempts;
        self
    }

    /// Set the reconnect attempt ceiling and back-off
    pub const fn with_reconnect(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.max_reconnect_attempts = attempts;
        self.reconnect_delay_ms = delay_ms;
        self
    }
}
