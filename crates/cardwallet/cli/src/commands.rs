//! Subcommand implementations

use bytes::Bytes;
use cardwallet::{
    AttestWalletKeyCommand, CardSession, CheckWalletCommand, ConfirmationMode, DerivationPath,
    DeriveWalletPublicKeysTask, PreflightReadTask,
};
use cardwallet_apdu_core::CardTransport;
use cardwallet_apdu_transport_pcsc::{CardPresence, PcscDeviceManager};
use serde::Serialize;

use crate::display::{
    card_summary, derived_key, key_value_box, section_title, success, wallet_summary, warning,
};

/// How results are printed
#[derive(Debug, Clone, Copy)]
pub(crate) struct Output {
    pub(crate) json: bool,
}

impl Output {
    /// Print `value` as JSON, or fall back to the human rendering
    fn emit<V: Serialize>(self, value: &V, human: impl FnOnce()) -> eyre::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}

pub(crate) fn list_readers(manager: &PcscDeviceManager) -> eyre::Result<()> {
    let readers = manager.list_readers()?;

    println!("{}", section_title("Available readers"));
    for (i, reader) in readers.iter().enumerate() {
        let status = match reader.presence() {
            CardPresence::Empty => "no card",
            CardPresence::Exclusive => "card held by another application",
            CardPresence::Present if reader.is_contactless() => "contactless card",
            CardPresence::Present => "card present",
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
        if let Some(atr) = reader.atr() {
            println!("   ATR {}", hex::encode_upper(atr));
        }
    }

    Ok(())
}

pub(crate) fn read<T: CardTransport>(
    session: &mut CardSession<T>,
    output: Output,
) -> eyre::Result<()> {
    let mode = session.environment().config.default_read_mode.clone();
    let card = session.start(PreflightReadTask::new(mode, None))?;

    output.emit(&card, || {
        println!("{}", card_summary(&card));
        if card.wallets.is_empty() {
            println!("{}", warning("No wallets read"));
        }
        for wallet in &card.wallets {
            println!("{}", wallet_summary(wallet));
        }
    })
}

pub(crate) fn check_wallet<T: CardTransport>(
    session: &mut CardSession<T>,
    public_key: Bytes,
    output: Output,
) -> eyre::Result<()> {
    let proof = session.start(CheckWalletCommand::new(public_key))?;

    output.emit(&proof, || {
        println!("{}", success("Card holds the wallet key"));
        println!(
            "{}",
            key_value_box(
                "Proof",
                vec![
                    ("Card ID", proof.card_id.clone()),
                    ("Challenge", hex::encode(&proof.challenge)),
                    ("Salt", hex::encode(&proof.salt)),
                    ("Signature", hex::encode(&proof.wallet_signature)),
                ],
            )
        );
    })
}

pub(crate) fn attest_wallet<T: CardTransport>(
    session: &mut CardSession<T>,
    public_key: Bytes,
    confirmation: ConfirmationMode,
    output: Output,
) -> eyre::Result<()> {
    let attestation = session.start(
        AttestWalletKeyCommand::new(public_key).with_confirmation_mode(confirmation),
    )?;

    output.emit(&attestation, || {
        println!("{}", success("Wallet key attested"));
        let mut items = vec![
            ("Card ID", attestation.card_id.clone()),
            ("Challenge", hex::encode(&attestation.challenge)),
            ("Salt", hex::encode(&attestation.salt)),
            ("Wallet signature", hex::encode(&attestation.wallet_signature)),
        ];
        if let Some(signature) = &attestation.card_signature {
            items.push(("Card signature", hex::encode(signature)));
        }
        if let Some(counter) = attestation.counter {
            items.push(("Counter", counter.to_string()));
        }
        println!("{}", key_value_box("Attestation", items));
    })
}

#[derive(Serialize)]
struct DerivedKey<'a> {
    path: &'a str,
    #[serde(flatten)]
    key: &'a cardwallet::ExtendedPublicKey,
}

pub(crate) fn derive<T: CardTransport>(
    session: &mut CardSession<T>,
    public_key: Bytes,
    paths: Vec<(String, DerivationPath)>,
    output: Output,
) -> eyre::Result<()> {
    let (labels, paths): (Vec<_>, Vec<_>) = paths.into_iter().unzip();
    let keys = session.start(DeriveWalletPublicKeysTask::new(public_key, paths))?;

    let derived: Vec<_> = labels
        .iter()
        .zip(&keys)
        .map(|(path, key)| DerivedKey { path, key })
        .collect();

    output.emit(&derived, || {
        println!("{}", section_title("Derived keys"));
        for entry in &derived {
            println!("{}", derived_key(entry.path, entry.key));
        }
    })
}
