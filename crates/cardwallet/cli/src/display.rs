//! Terminal formatting helpers

use std::fmt::Display;

use cardwallet::{Card, CardWallet, ExtendedPublicKey};
use colored::Colorize;

/// A formatted section title
pub(crate) struct SectionTitle(pub(crate) &'static str);

impl Display for SectionTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\n{}", self.0.bold().underline())
    }
}

pub(crate) const fn section_title(title: &'static str) -> SectionTitle {
    SectionTitle(title)
}

pub(crate) fn success(message: &str) -> String {
    format!("✅ {}", message.green().bold())
}

pub(crate) fn warning(message: &str) -> String {
    format!("⚠️  {}", message.yellow().bold())
}

/// Format a key-value section
pub(crate) fn key_value_box(title: &str, items: Vec<(&str, String)>) -> String {
    let mut result = format!("{}", title.bold().underline());

    for (key, value) in items {
        result.push_str(&format!("\n  {}: {}", key.bold(), value));
    }

    result
}

pub(crate) fn card_summary(card: &Card) -> String {
    let mut items = vec![
        ("Card ID", card.card_id.clone()),
        ("Manufacturer", card.manufacturer_name.clone()),
        ("Firmware", card.firmware_version.to_string()),
        ("Status", format!("{:?}", card.status)),
        ("Card key", hex::encode(&card.card_public_key)),
    ];
    if let Some(curve) = card.curve {
        items.push(("Curve", curve.name().to_string()));
    }
    if let Some(backup) = &card.backup_status {
        items.push(("Backup", format!("{backup:?}")));
    }
    items.push(("Slots", card.slot_count().to_string()));
    key_value_box("Card", items)
}

pub(crate) fn wallet_summary(wallet: &CardWallet) -> String {
    let mut items = vec![("Status", format!("{:?}", wallet.status))];
    if let Some(curve) = wallet.curve {
        items.push(("Curve", curve.name().to_string()));
    }
    if let Some(key) = &wallet.public_key {
        items.push(("Public key", hex::encode(key)));
    }
    if let Some(signed) = wallet.signed_hashes {
        items.push(("Signed hashes", signed.to_string()));
    }
    key_value_box(&format!("Wallet #{}", wallet.index), items)
}

pub(crate) fn derived_key(path: &str, key: &ExtendedPublicKey) -> String {
    key_value_box(
        path,
        vec![
            ("Public key", hex::encode(&key.public_key)),
            ("Chain code", hex::encode(&key.chain_code)),
        ],
    )
}
