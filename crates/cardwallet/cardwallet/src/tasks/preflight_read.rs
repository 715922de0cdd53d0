use std::fmt;

use cardwallet_apdu_core::CardTransport;
use tracing::{debug, warn};

use crate::{
    Card, Result, SessionEnvironment,
    commands::{PreflightReadMode, ReadCommand, ReadWalletCommand, ReadWalletsListCommand},
    session::{CardSession, CardSessionRunnable, PreflightFilterFactory},
};

/// Caller supplied check of the card a session is about to use
///
/// One filter is built per card. Returning an error aborts the preflight read.
pub trait PreflightReadFilter: Send {
    /// Called right after the base read
    fn on_card_read(&self, _card: &Card, _environment: &SessionEnvironment) -> Result<()> {
        Ok(())
    }

    /// Called after the wallet list was read
    fn on_full_card_read(&self, _card: &Card, _environment: &SessionEnvironment) -> Result<()> {
        Ok(())
    }
}

/// Reads what a runnable needs to know about the card
///
/// Always performs the base read and checks the card against the configured
/// [`CardFilter`](crate::CardFilter). Cards with multi-wallet firmware then get
/// their wallet list or the requested wallet read, depending on the mode.
pub struct PreflightReadTask {
    mode: PreflightReadMode,
    factory: Option<PreflightFilterFactory>,
    filter: Option<Box<dyn PreflightReadFilter>>,
}

impl fmt::Debug for PreflightReadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreflightReadTask")
            .field("mode", &self.mode)
            .field("filter", &self.factory.is_some())
            .finish()
    }
}

impl PreflightReadTask {
    /// Read for `mode`, consulting filters built by `factory`
    pub fn new(mode: PreflightReadMode, factory: Option<PreflightFilterFactory>) -> Self {
        Self {
            mode,
            factory,
            filter: None,
        }
    }

    fn filter(&mut self, card: &Card) -> Option<&dyn PreflightReadFilter> {
        if self.filter.is_none() {
            self.filter = self.factory.as_ref().map(|factory| factory(card));
        }
        self.filter.as_deref()
    }

    fn check_card<T: CardTransport>(
        &mut self,
        session: &CardSession<T>,
        card: &Card,
    ) -> Result<()> {
        session.environment().config.filter.verify_card(card)?;
        if let Some(filter) = self.filter(card) {
            filter.on_card_read(card, session.environment())?;
        }
        Ok(())
    }
}

impl<T: CardTransport> CardSessionRunnable<T> for PreflightReadTask {
    type Output = Card;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn run(&mut self, session: &mut CardSession<T>) -> Result<Card> {
        let card = session.run_command(&mut ReadCommand::new())?;

        if let Err(error) = self.check_card(session, &card) {
            warn!(card_id = %card.card_id, %error, "Card rejected");
            session.environment_mut().card = None;
            return Err(error);
        }

        if !card.firmware_version.is_multi_wallet() {
            debug!(
                firmware = %card.firmware_version,
                "Single wallet firmware, base read is enough"
            );
            return Ok(session.environment().card()?.clone());
        }

        match &self.mode {
            PreflightReadMode::FullCardRead => {
                session.run_command(&mut ReadWalletsListCommand)?;
                let card = session.environment().card()?;
                let verdict = match self.filter(card) {
                    Some(filter) => filter.on_full_card_read(card, session.environment()),
                    None => Ok(()),
                };
                if let Err(error) = verdict {
                    warn!(card_id = %card.card_id, %error, "Card rejected after wallet list");
                    session.environment_mut().card = None;
                    return Err(error);
                }
            }
            PreflightReadMode::ReadWallet(public_key) => {
                session.run_command(&mut ReadWalletCommand::new(public_key.clone()))?;
            }
            PreflightReadMode::None | PreflightReadMode::ReadCardOnly => {}
        }

        Ok(session.environment().card()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use bytes::Bytes;
    use cardwallet_apdu_core::{
        CommandApdu, Instruction, MockTransport, ResponseApdu, Tag, TlvBuilder,
        response::status::common,
    };

    use super::*;
    use crate::{Config, Error, PurgeWalletCommand, card::tests::card};

    fn read(firmware: &str) -> Bytes {
        let card = card();
        let body = TlvBuilder::new(true)
            .append(Tag::CardId, &card.card_id)
            .unwrap()
            .append(Tag::ManufacturerName, &card.manufacturer_name)
            .unwrap()
            .append(Tag::Status, 2u8)
            .unwrap()
            .append(Tag::FirmwareVersion, firmware)
            .unwrap()
            .append(Tag::CardPublicKey, &card.card_public_key)
            .unwrap()
            .append(Tag::CurveId, "secp256k1")
            .unwrap()
            .append(Tag::WalletPublicKey, &[0x02; 33])
            .unwrap()
            .append(Tag::WalletsCount, 1u8)
            .unwrap()
            .serialize()
            .unwrap();
        ResponseApdu::new(body, common::SUCCESS).to_bytes()
    }

    fn wallets() -> Bytes {
        let wallet = TlvBuilder::new(true)
            .append(Tag::WalletIndex, 0u8)
            .unwrap()
            .append(Tag::Status, 2u8)
            .unwrap()
            .append(Tag::CurveId, "secp256k1")
            .unwrap()
            .append(Tag::WalletPublicKey, &[0x02; 33])
            .unwrap();
        let body = TlvBuilder::new(true)
            .append(Tag::CardId, &card().card_id)
            .unwrap()
            .append_nested(Tag::WalletInfo, wallet)
            .unwrap()
            .serialize()
            .unwrap();
        ResponseApdu::new(body, common::SUCCESS).to_bytes()
    }

    #[derive(Default)]
    struct Counting {
        card_reads: Arc<AtomicUsize>,
        full_reads: Arc<AtomicUsize>,
    }

    impl PreflightReadFilter for Counting {
        fn on_card_read(&self, _card: &Card, _env: &SessionEnvironment) -> Result<()> {
            self.card_reads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_full_card_read(&self, card: &Card, _env: &SessionEnvironment) -> Result<()> {
            self.full_reads.fetch_add(1, Ordering::SeqCst);
            if card.wallets.is_empty() {
                return Err(Error::FilterRejected("no wallets".into()));
            }
            Ok(())
        }
    }

    struct Reject;

    impl PreflightReadFilter for Reject {
        fn on_card_read(&self, card: &Card, _env: &SessionEnvironment) -> Result<()> {
            Err(Error::FilterRejected(card.card_id.clone()))
        }
    }

    struct RejectFull;

    impl PreflightReadFilter for RejectFull {
        fn on_full_card_read(&self, _card: &Card, _env: &SessionEnvironment) -> Result<()> {
            Err(Error::FilterRejected("full".into()))
        }
    }

    fn session(responses: Vec<Bytes>) -> CardSession<MockTransport> {
        let mut session = CardSession::new(MockTransport::new(responses), Config::default());
        session.transport_mut().connected = true;
        session
    }

    #[test]
    fn test_full_read_consults_filter_twice() {
        let counting = Counting::default();
        let (card_reads, full_reads) = (counting.card_reads.clone(), counting.full_reads.clone());
        let builds = Arc::new(AtomicUsize::new(0));
        let b = builds.clone();
        let factory: PreflightFilterFactory = Arc::new(move |_: &Card| {
            b.fetch_add(1, Ordering::SeqCst);
            Box::new(Counting {
                card_reads: card_reads.clone(),
                full_reads: full_reads.clone(),
            }) as Box<dyn PreflightReadFilter>
        });

        let mut session = session(vec![read("6.33r"), wallets()]);
        let card = session
            .start(PreflightReadTask::new(PreflightReadMode::FullCardRead, Some(factory)))
            .unwrap();
        assert!(card.is_fully_read());
        assert_eq!(card.wallets.len(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(counting.card_reads.load(Ordering::SeqCst), 1);
        assert_eq!(counting.full_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_preflight_uses_installed_filter() {
        let mut session = session(vec![read("6.33r"), wallets()]).with_preflight_filter(|_| {
            Box::new(Reject) as Box<dyn PreflightReadFilter>
        });
        assert!(matches!(
            session.start(ReadWalletsListCommand),
            Err(Error::FilterRejected(_))
        ));
        assert_eq!(session.transport().commands.len(), 1);
    }

    #[test]
    fn test_single_wallet_firmware_stops_after_read() {
        let mut session = session(vec![read("3.29r")]);
        let card = session
            .start(PreflightReadTask::new(PreflightReadMode::FullCardRead, None))
            .unwrap();
        assert_eq!(card.wallets.len(), 1);
        assert_eq!(card.wallets[0].index, 0);
        assert_eq!(session.transport().commands.len(), 1);
    }

    #[test]
    fn test_card_only_skips_wallet_list() {
        let mut session = session(vec![read("6.33r")]);
        session
            .start(PreflightReadTask::new(PreflightReadMode::ReadCardOnly, None))
            .unwrap();
        assert_eq!(session.transport().commands.len(), 1);
        assert!(!session.environment().card().unwrap().is_fully_read());
    }

    #[test]
    fn test_rejected_card_aborts() {
        let mut session = session(vec![read("6.33r"), wallets()]);
        session.environment_mut().config.filter.allowed_card_types = Vec::new();
        assert!(matches!(
            session.start(PreflightReadTask::new(PreflightReadMode::FullCardRead, None)),
            Err(Error::WrongCardType(_))
        ));
        assert_eq!(session.transport().commands.len(), 1);
        assert!(session.environment().card.is_none());
    }

    #[test]
    fn test_rejected_full_read_is_not_reused() {
        let mut session = session(vec![read("6.33r"), wallets(), read("6.33r"), wallets()])
            .with_preflight_filter(|_| Box::new(RejectFull) as Box<dyn PreflightReadFilter>);

        assert!(matches!(
            session.start(PurgeWalletCommand::new(0)),
            Err(Error::FilterRejected(_))
        ));
        assert!(session.environment().card.is_none());

        assert!(matches!(
            session.start(PurgeWalletCommand::new(0)),
            Err(Error::FilterRejected(_))
        ));
        let sent: Vec<_> = session
            .transport()
            .commands
            .iter()
            .map(|frame| CommandApdu::from_bytes(frame).unwrap().ins)
            .collect();
        assert_eq!(
            sent,
            vec![
                Instruction::Read,
                Instruction::ReadWalletsList,
                Instruction::Read,
                Instruction::ReadWalletsList,
            ]
        );
    }
}
