//! Session behaviour against a simulated card

mod common;

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use bytes::Bytes;
use cardwallet::{
    BackupCard, BackupStatus, CheckWalletCommand, Config, CreateWalletCommand,
    DeriveWalletPublicKeyTask, DerivationPath, EllipticCurve, Error, ErrorCategory,
    LinkOriginCardCommand, LinkableOriginCard, PurgeWalletCommand, ReadCommand, SessionState,
    SignHashesCommand, UserCodeProvider, WalletIndex, WalletStatus,
};
use cardwallet_apdu_core::{EncryptionMode, Instruction};
use common::{SimulatedCard, session, session_with};

#[test]
fn test_security_delay_then_success() {
    let mut card = SimulatedCard::new(3);
    card.pending_delays = 3;
    let mut session = session(card);

    let card = session.start(ReadCommand::new()).unwrap();
    assert_eq!(card.card_id, common::CARD_ID);
    assert_eq!(session.transport().exchanges, 4);
    assert_eq!(session.transport().instructions(), vec![Instruction::Read]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_check_wallet_verifies_card_proof() {
    let mut card = SimulatedCard::new(3);
    let key = card.load_wallet(1, EllipticCurve::Secp256k1);
    let mut session = session(card);

    let proof = session.start(CheckWalletCommand::new(key.clone())).unwrap();
    assert_eq!(proof.challenge.len(), 16);
    assert_eq!(proof.salt.len(), 16);

    session.transport_mut().tamper_signatures = true;
    let error = session.start(CheckWalletCommand::new(key)).unwrap_err();
    assert!(matches!(error, Error::CardVerificationFailed));
    assert_eq!(error.category(), ErrorCategory::Verification);
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn test_check_wallet_on_ed25519() {
    let mut card = SimulatedCard::new(2);
    let key = card.load_wallet(0, EllipticCurve::Ed25519);
    let mut session = session(card);

    session.start(CheckWalletCommand::new(key)).unwrap();
}

#[test]
fn test_create_wallet_touches_only_its_slot() {
    let mut card = SimulatedCard::new(3);
    let first = card.load_wallet(0, EllipticCurve::Secp256k1);
    let mut session = session(card);

    let created = session
        .start(CreateWalletCommand::new(EllipticCurve::Secp256k1).with_index(2))
        .unwrap();
    assert_eq!(created.index, 2);

    let wallets = &session.environment().card().unwrap().wallets;
    assert_eq!(wallets.len(), 3);
    assert_eq!(wallets[0].public_key.as_ref(), Some(&first));
    assert_eq!(wallets[1].status, WalletStatus::Empty);
    assert_eq!(wallets[2].status, WalletStatus::Loaded);
    assert_eq!(wallets[2].public_key.as_ref(), Some(&created.public_key));
}

#[test]
fn test_create_in_used_slot_is_rejected_before_sending() {
    let mut card = SimulatedCard::new(2);
    card.load_wallet(0, EllipticCurve::Secp256k1);
    let mut session = session(card);

    let error = session
        .start(CreateWalletCommand::new(EllipticCurve::Secp256k1).with_index(0))
        .unwrap_err();
    assert!(matches!(error, Error::WalletAlreadyCreated));
    assert_eq!(error.category(), ErrorCategory::PreCheck);
    assert!(
        !session
            .transport()
            .instructions()
            .contains(&Instruction::CreateWallet)
    );
}

#[test]
fn test_purge_then_sign_fails_without_contacting_card() {
    let mut card = SimulatedCard::new(2);
    card.load_wallet(1, EllipticCurve::Secp256k1);
    let mut session = session(card);

    session.start(PurgeWalletCommand::new(1)).unwrap();
    assert_eq!(
        session.environment().card().unwrap().wallets[1].status,
        WalletStatus::Empty
    );

    let sent = session.transport().processed.len();
    let sign = SignHashesCommand::new(vec![Bytes::from_static(&[0x11; 32])], 1u32).unwrap();
    assert!(matches!(session.start(sign), Err(Error::WalletNotFound)));
    assert_eq!(session.transport().processed.len(), sent);
}

#[test]
fn test_sign_updates_counter() {
    let mut card = SimulatedCard::new(1);
    let key = card.load_wallet(0, EllipticCurve::Secp256k1);
    let mut session = session(card);

    let hashes = vec![Bytes::from_static(&[0x11; 32]), Bytes::from_static(&[0x22; 32])];
    let signed = session
        .start(SignHashesCommand::new(hashes, key.clone()).unwrap())
        .unwrap();
    assert_eq!(signed.signatures.len(), 2);
    assert_eq!(signed.total_signed_hashes, Some(2));

    let wallet = session
        .environment()
        .card()
        .unwrap()
        .wallet(&WalletIndex::PublicKey(key))
        .unwrap()
        .clone();
    assert_eq!(wallet.signed_hashes, Some(2));
}

#[test]
fn test_foreign_card_leaves_environment() {
    let mut card = SimulatedCard::new(1);
    card.impostor_id = Some("AB01000000000001".into());
    let mut session = session(card);

    let read = session.start(ReadCommand::new()).unwrap();
    let error = session.start(ReadCommand::new()).unwrap_err();
    assert!(matches!(error, Error::WrongCardNumber { .. }));
    assert_eq!(session.environment().card().unwrap(), &read);
}

#[test]
fn test_derive_same_path_twice_records_once() {
    let mut card = SimulatedCard::new(1);
    let key = card.load_wallet(0, EllipticCurve::Secp256k1);
    let mut session = session(card);
    let path = DerivationPath::from_str("m/44'/0'/0'/0/0").unwrap();

    let first = session
        .start(DeriveWalletPublicKeyTask::new(key.clone(), path.clone()))
        .unwrap();
    let second = session
        .start(DeriveWalletPublicKeyTask::new(key.clone(), path))
        .unwrap();
    assert_eq!(first, second);

    let card = session.environment().card().unwrap();
    let wallet = card.wallet(&WalletIndex::PublicKey(key)).unwrap();
    assert_eq!(wallet.derived_keys, vec![first]);
}

#[test]
fn test_link_three_backups_in_order() {
    let mut session = session(SimulatedCard::new(1));
    let backups: Vec<_> = (1..=3u8)
        .map(|i| BackupCard {
            card_id: format!("AB0100000000000{i}"),
            linking_key: Bytes::from(vec![i; 33]),
        })
        .collect();

    let linked = session
        .start(LinkOriginCardCommand::new(
            LinkableOriginCard {
                linking_key: Bytes::from_static(&[0xAA; 33]),
                certificate: Bytes::from_static(&[0xCE; 64]),
            },
            backups,
            Bytes::from_static(&[0x5E; 64]),
            "141414",
            "8888",
        ))
        .unwrap();
    assert_eq!(linked.card_id, common::CARD_ID);

    let links = &session.transport().backup_links;
    assert_eq!(
        links.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        links.iter().map(|(_, key)| key[0]).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        session.environment().card().unwrap().backup_status,
        Some(BackupStatus::CardLinked { cards_count: 3 })
    );
}

#[test]
fn test_link_without_backups_is_not_sent() {
    let mut session = session(SimulatedCard::new(1));
    let error = session
        .start(LinkOriginCardCommand::new(
            LinkableOriginCard {
                linking_key: Bytes::from_static(&[0xAA; 33]),
                certificate: Bytes::from_static(&[0xCE; 64]),
            },
            Vec::new(),
            Bytes::from_static(&[0x5E; 64]),
            "141414",
            "8888",
        ))
        .unwrap_err();

    assert!(matches!(error, Error::InvalidArgument(_)));
    assert!(session.transport().backup_links.is_empty());
    assert!(
        !session
            .transport()
            .instructions()
            .contains(&Instruction::LinkOriginCard)
    );
}

#[test]
fn test_cancel_during_security_delay() {
    let mut card = SimulatedCard::new(1);
    card.pending_delays = 1_000;
    let mut session = session(card);

    let token = session.cancellation_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });

    assert!(matches!(session.start(ReadCommand::new()), Err(Error::Cancelled)));
    canceller.join().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.environment().card.is_none());
    assert!(session.transport().processed.is_empty());
}

#[test]
fn test_reconnects_after_link_loss() {
    let mut card = SimulatedCard::new(2);
    let key = card.load_wallet(0, EllipticCurve::Secp256k1);
    card.drop_link_at = vec![1, 3];
    let mut session = session(card);

    session.start(CheckWalletCommand::new(key)).unwrap();
    assert_eq!(session.transport().opens, 3);
}

#[test]
fn test_gives_up_after_reconnect_ceiling() {
    let mut card = SimulatedCard::new(1);
    card.drop_link_at = (1..=10).collect();
    let mut session = session_with(card, Config::default().with_reconnect(2, 1));

    let error = session.start(ReadCommand::new()).unwrap_err();
    assert!(matches!(error, Error::ConnectionLost));
    assert_eq!(error.category(), ErrorCategory::Transport);
}

#[test]
fn test_encrypted_session() {
    for mode in [EncryptionMode::Fast, EncryptionMode::Strong] {
        let mut card = SimulatedCard::new(2);
        let key = card.load_wallet(1, EllipticCurve::Secp256k1);
        let mut session = session_with(card, Config::default().with_encryption_mode(mode));

        session.start(CheckWalletCommand::new(key)).unwrap();
        let card = session.transport();
        assert_eq!(card.processed[0].ins, Instruction::OpenSession);
        assert!(
            card.processed[1..]
                .iter()
                .all(|apdu| apdu.encryption_mode() == Some(mode))
        );
        assert!(session.environment().encryption_key().is_some());
    }
}

#[test]
fn test_renegotiates_key_after_reconnect() {
    let mut card = SimulatedCard::new(1);
    let key = card.load_wallet(0, EllipticCurve::Secp256k1);
    // Exchanges: open session, read, wallet read, then the check drops.
    card.drop_link_at = vec![4];
    let mut session = session_with(
        card,
        Config::default().with_encryption_mode(EncryptionMode::Fast),
    );

    session.start(CheckWalletCommand::new(key)).unwrap();
    let opened = session
        .transport()
        .instructions()
        .iter()
        .filter(|ins| **ins == Instruction::OpenSession)
        .count();
    assert_eq!(opened, 2);
}

#[test]
fn test_card_demanding_encryption_upgrades_session() {
    let mut card = SimulatedCard::new(1);
    card.require_encryption = true;
    let mut session = session(card);

    session.start(ReadCommand::new()).unwrap();
    assert_eq!(session.environment().encryption_mode(), EncryptionMode::Fast);
    assert_eq!(
        session.transport().instructions(),
        vec![Instruction::OpenSession, Instruction::Read]
    );
}

#[test]
fn test_access_code_from_provider() {
    let mut card = SimulatedCard::new(1);
    card.set_access_code("246810");
    let mut provided = session(card).with_access_code_provider("246810");
    provided.start(ReadCommand::new()).unwrap();

    let mut card = SimulatedCard::new(1);
    card.set_access_code("246810");
    let mut session = session(card);
    assert!(matches!(
        session.start(ReadCommand::new()),
        Err(Error::WrongAccessCode)
    ));
}

#[test]
fn test_wrong_code_is_requested_again() {
    let mut card = SimulatedCard::new(1);
    card.set_access_code("246810");
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut session = session(card).with_access_code_provider(UserCodeProvider::callback(
        move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            Some(if attempt == 0 { "111111" } else { "246810" }.to_owned())
        },
    ));

    assert!(matches!(
        session.start(ReadCommand::new()),
        Err(Error::WrongAccessCode)
    ));
    session.start(ReadCommand::new()).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
