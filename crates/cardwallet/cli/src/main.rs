//! Command-line interface for contactless wallet cards

use std::{path::PathBuf, str::FromStr};

use bytes::Bytes;
use cardwallet::{CardSession, ConfirmationMode, DerivationPath};
use cardwallet_apdu_core::EncryptionMode;
use cardwallet_apdu_transport_pcsc::{PcscConfig, PcscDeviceManager, PcscTransport};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

mod commands;
mod config;
mod display;

#[derive(Parser)]
#[command(version, about = "Inspect and use contactless wallet cards over PC/SC")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long)]
    reader: Option<String>,

    /// Trace level output
    #[arg(short, long)]
    verbose: bool,

    /// TOML file overriding the session configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Payload encryption, overrides the configuration
    #[arg(long, value_enum)]
    encryption: Option<Encryption>,

    /// Access code; the factory default is used when absent
    #[arg(long, env = "CARDWALLET_ACCESS_CODE", hide_env_values = true)]
    access_code: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    Readers,

    /// Read the card and its wallets
    Read,

    /// Prove that the card holds a wallet key
    CheckWallet {
        /// Wallet public key in hex
        #[arg(value_parser = parse_hex)]
        public_key: Bytes,
    },

    /// Attest a wallet key, optionally confirmed by the card key
    AttestWallet {
        /// Wallet public key in hex
        #[arg(value_parser = parse_hex)]
        public_key: Bytes,

        /// Confirmation requested from the card key
        #[arg(long, value_enum, default_value_t = Confirmation::Dynamic)]
        confirmation: Confirmation,
    },

    /// Derive child public keys of a wallet
    Derive {
        /// Wallet public key in hex
        #[arg(value_parser = parse_hex)]
        public_key: Bytes,

        /// Derivation paths, e.g. m/44'/0'/0'/0/0
        #[arg(required = true, value_parser = parse_path)]
        paths: Vec<(String, DerivationPath)>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Encryption {
    None,
    Fast,
    Strong,
}

impl From<Encryption> for EncryptionMode {
    fn from(value: Encryption) -> Self {
        match value {
            Encryption::None => Self::None,
            Encryption::Fast => Self::Fast,
            Encryption::Strong => Self::Strong,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Confirmation {
    None,
    Static,
    Dynamic,
}

impl From<Confirmation> for ConfirmationMode {
    fn from(value: Confirmation) -> Self {
        match value {
            Confirmation::None => Self::None,
            Confirmation::Static => Self::Static,
            Confirmation::Dynamic => Self::Dynamic,
        }
    }
}

fn parse_hex(value: &str) -> Result<Bytes, hex::FromHexError> {
    hex::decode(value.trim_start_matches("0x")).map(Bytes::from)
}

fn parse_path(value: &str) -> Result<(String, DerivationPath), String> {
    let path = DerivationPath::from_str(value).map_err(|e| e.to_string())?;
    Ok((value.to_owned(), path))
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let manager = PcscDeviceManager::new()?;

    if let Commands::Readers = cli.command {
        return commands::list_readers(&manager);
    }

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(encryption) = cli.encryption {
        config = config.with_encryption_mode(encryption.into());
    }

    let transport = open_transport(&manager, cli.reader.as_deref())?;
    info!(reader = transport.reader_name(), "Using reader");

    let mut session = CardSession::new(transport, config);
    if let Some(code) = cli.access_code {
        session = session.with_access_code_provider(code);
    }

    let output = commands::Output { json: cli.json };
    let result = match cli.command {
        Commands::Readers => Ok(()),
        Commands::Read => commands::read(&mut session, output),
        Commands::CheckWallet { public_key } => {
            commands::check_wallet(&mut session, public_key, output)
        }
        Commands::AttestWallet {
            public_key,
            confirmation,
        } => commands::attest_wallet(&mut session, public_key, confirmation.into(), output),
        Commands::Derive { public_key, paths } => {
            commands::derive(&mut session, public_key, paths, output)
        }
    };

    session.close();
    result
}

fn open_transport(
    manager: &PcscDeviceManager,
    reader: Option<&str>,
) -> eyre::Result<PcscTransport> {
    match reader {
        Some(name) => {
            let readers = manager.list_readers()?;
            if !readers.iter().any(|r| r.name() == name) {
                eyre::bail!("Reader '{name}' not found");
            }
            Ok(manager.open_reader_with_config(name, PcscConfig::default())?)
        }
        None => Ok(manager.open_first_card(PcscConfig::default())?),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(true)
        .init();
}
