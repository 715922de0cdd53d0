use bytes::Bytes;
use cardwallet_apdu_core::{CardTransport, Tag, TlvError};
use coins_bip32::path::DerivationPath;
use tracing::debug;

use crate::{
    Error, ExtendedPublicKey, Result, WalletIndex,
    commands::{PreflightReadMode, ReadWalletCommand, find_wallet},
    session::{CardSession, CardSessionRunnable},
};

/// Derives a BIP-32 child key of a wallet
///
/// Only secp256k1 and ed25519 wallets can derive. The key is recorded in the
/// wallet's derived keys unless an equal key is already there.
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeyTask {
    wallet_public_key: Bytes,
    path: DerivationPath,
}

impl DeriveWalletPublicKeyTask {
    /// Derive `path` from the wallet with `wallet_public_key`
    pub const fn new(wallet_public_key: Bytes, path: DerivationPath) -> Self {
        Self {
            wallet_public_key,
            path,
        }
    }
}

impl<T: CardTransport> CardSessionRunnable<T> for DeriveWalletPublicKeyTask {
    type Output = ExtendedPublicKey;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadWallet(self.wallet_public_key.clone())
    }

    fn run(&mut self, session: &mut CardSession<T>) -> Result<ExtendedPublicKey> {
        derive(session, &self.wallet_public_key, &self.path)
    }
}

/// Derives several child keys of one wallet, in the order given
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeysTask {
    wallet_public_key: Bytes,
    paths: Vec<DerivationPath>,
}

impl DeriveWalletPublicKeysTask {
    /// Derive every path from the wallet with `wallet_public_key`
    pub const fn new(wallet_public_key: Bytes, paths: Vec<DerivationPath>) -> Self {
        Self {
            wallet_public_key,
            paths,
        }
    }
}

impl<T: CardTransport> CardSessionRunnable<T> for DeriveWalletPublicKeysTask {
    /// One key per path, in path order
    type Output = Vec<ExtendedPublicKey>;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadWallet(self.wallet_public_key.clone())
    }

    fn run(&mut self, session: &mut CardSession<T>) -> Result<Self::Output> {
        self.paths
            .iter()
            .map(|path| derive(session, &self.wallet_public_key, path))
            .collect()
    }
}

fn derive<T: CardTransport>(
    session: &mut CardSession<T>,
    wallet_public_key: &Bytes,
    path: &DerivationPath,
) -> Result<ExtendedPublicKey> {
    let index = WalletIndex::PublicKey(wallet_public_key.clone());
    let card = session.environment().card()?;
    let wallet = find_wallet(card, &index)?;
    match wallet.curve.or(card.curve) {
        Some(curve) if curve.is_bip32_compatible() => {}
        _ => return Err(Error::UnsupportedCurve),
    }

    let response =
        session.run_command(&mut ReadWalletCommand::new(index.clone()).with_path(path.clone()))?;
    let chain_code = response
        .chain_code
        .ok_or(TlvError::MissingTag(Tag::WalletHdChain))?;
    let public_key = response
        .wallet
        .public_key
        .ok_or(TlvError::MissingTag(Tag::WalletPublicKey))?;
    let key = ExtendedPublicKey::new(public_key, chain_code);

    let wallet = session
        .environment_mut()
        .card_mut()?
        .wallet_mut(&index)
        .ok_or(Error::WalletNotFound)?;
    if wallet.add_derived_key(key.clone()) {
        debug!(wallet = wallet.index, derived = wallet.derived_keys.len(), "Derived key recorded");
    }
    Ok(key)
}
