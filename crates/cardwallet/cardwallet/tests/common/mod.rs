//! In-memory card used by the integration tests
#![allow(dead_code, unreachable_pub)]

use bytes::{Bytes, BytesMut};
use cardwallet::{
    CardSession, CardSettings, Config, CryptoProvider, EllipticCurve, KeyPair, SoftwareCrypto,
};
use cardwallet_apdu_core::{
    CardTransport, CommandApdu, EncryptionKey, EncryptionMode, Instruction, ResponseApdu,
    StatusWord, Tag, TlvBuilder, TlvDecoder, TransportError, response::status::common,
};
use k256::{PublicKey, SecretKey, ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint};
use sha2::{Digest, Sha256};

pub const CARD_ID: &str = "CB79000000018201";
pub const ACCESS_CODE: &str = "000000";
pub const PASSCODE: &str = "000";

type Outcome = Result<Bytes, StatusWord>;

/// A wallet slot held by the simulated card
#[derive(Debug, Clone)]
pub struct SimWallet {
    pub curve: EllipticCurve,
    pub keys: KeyPair,
    pub signed_hashes: u32,
}

/// A contactless card answering the wallet protocol
#[derive(Debug)]
pub struct SimulatedCard {
    pub card_id: String,
    pub firmware: &'static str,
    pub settings_mask: u32,
    pub slots: Vec<Option<SimWallet>>,
    access_code: [u8; 32],
    passcode: [u8; 32],
    /// Security delay responses sent before the next command is processed
    pub pending_delays: u32,
    /// Exchanges, counted from 1, on which the link drops
    pub drop_link_at: Vec<usize>,
    /// Answer plain frames with a demand for encryption
    pub require_encryption: bool,
    /// Flip a bit in every wallet signature
    pub tamper_signatures: bool,
    /// Card id reported after the first read
    pub impostor_id: Option<String>,
    pub connected: bool,
    pub opens: usize,
    pub exchanges: usize,
    /// Every command processed, payload decrypted
    pub processed: Vec<CommandApdu>,
    /// Backup links written, as (file index, linking key)
    pub backup_links: Vec<(u8, Bytes)>,
    session_key: Option<EncryptionKey>,
    reads: usize,
}

impl SimulatedCard {
    /// Multi-wallet card with `slots` empty slots
    pub fn new(slots: usize) -> Self {
        Self {
            card_id: CARD_ID.to_owned(),
            firmware: "6.33r",
            settings_mask: CardSettings::REUSABLE | CardSettings::ALLOW_BACKUP,
            slots: vec![None; slots],
            access_code: Sha256::digest(ACCESS_CODE).into(),
            passcode: Sha256::digest(PASSCODE).into(),
            pending_delays: 0,
            drop_link_at: Vec::new(),
            require_encryption: false,
            tamper_signatures: false,
            impostor_id: None,
            connected: false,
            opens: 0,
            exchanges: 0,
            processed: Vec::new(),
            backup_links: Vec::new(),
            session_key: None,
            reads: 0,
        }
    }

    /// Put a fresh wallet in `index` and return its public key
    pub fn load_wallet(&mut self, index: usize, curve: EllipticCurve) -> Bytes {
        let keys = SoftwareCrypto.generate_key_pair(curve).expect("key generation");
        let public_key = Bytes::from(keys.public_key.clone());
        self.slots[index] = Some(SimWallet {
            curve,
            keys,
            signed_hashes: 0,
        });
        public_key
    }

    /// Change the access code the card expects
    pub fn set_access_code(&mut self, code: &str) {
        self.access_code = Sha256::digest(code).into();
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.processed.iter().map(|apdu| apdu.ins).collect()
    }

    fn wallet_index(&self, request: &TlvDecoder) -> Option<usize> {
        if let Ok(Some(index)) = request.decode_optional::<usize>(Tag::WalletIndex) {
            return (index < self.slots.len()).then_some(index);
        }
        let key: Bytes = request.decode_optional(Tag::WalletPublicKey).ok()??;
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|wallet| wallet.keys.public_key == key.as_ref())
        })
    }

    fn check_code(
        request: &TlvDecoder,
        tag: Tag,
        expected: &[u8; 32],
        wrong: StatusWord,
    ) -> Result<(), StatusWord> {
        match request.decode_optional::<Bytes>(tag) {
            Ok(Some(code)) if code.as_ref() == expected => Ok(()),
            _ => Err(wrong),
        }
    }

    fn builder(&self) -> TlvBuilder {
        let card_id = match (&self.impostor_id, self.reads > 1) {
            (Some(impostor), true) => impostor.clone(),
            _ => self.card_id.clone(),
        };
        TlvBuilder::new(true)
            .append(Tag::CardId, card_id)
            .expect("card id")
    }

    fn handle(&mut self, apdu: &CommandApdu) -> Outcome {
        let request = TlvDecoder::new(&apdu.data).map_err(|_| common::INVALID_STATE)?;
        if apdu.ins != Instruction::OpenSession {
            Self::check_code(&request, Tag::Pin, &self.access_code, common::WRONG_ACCESS_CODE)?;
        }

        let builder = match apdu.ins {
            Instruction::Read => self.read(),
            Instruction::ReadWalletsList => self.wallets_list(),
            Instruction::ReadWallet => self.read_wallet(&request)?,
            Instruction::CreateWallet => {
                Self::check_code(&request, Tag::Pin2, &self.passcode, common::WRONG_PASSCODE)?;
                self.create_wallet(&request)?
            }
            Instruction::PurgeWallet => {
                Self::check_code(&request, Tag::Pin2, &self.passcode, common::WRONG_PASSCODE)?;
                let index = self.wallet_index(&request).ok_or(common::WALLET_NOT_FOUND)?;
                self.slots[index] = None;
                self.builder().append(Tag::Status, 1u8).expect("status")
            }
            Instruction::Sign => {
                Self::check_code(&request, Tag::Pin2, &self.passcode, common::WRONG_PASSCODE)?;
                self.sign(&request)?
            }
            Instruction::AttestWalletKey => self.attest(&request)?,
            Instruction::LinkOriginCard => {
                Self::check_code(&request, Tag::Pin2, &self.passcode, common::WRONG_PASSCODE)?;
                self.link(&request)?
            }
            Instruction::OpenSession => return self.open_session(apdu, &request),
        };
        Ok(builder.serialize().expect("response"))
    }

    fn read(&mut self) -> TlvBuilder {
        self.reads += 1;
        let loaded = self.slots.iter().any(Option::is_some);
        self.builder()
            .append(Tag::ManufacturerName, "TANGEM")
            .and_then(|b| b.append(Tag::Status, if loaded { 2u8 } else { 1u8 }))
            .and_then(|b| b.append(Tag::FirmwareVersion, self.firmware))
            .and_then(|b| b.append(Tag::CardPublicKey, &[0x04; 65]))
            .and_then(|b| b.append(Tag::SettingsMask, self.settings_mask))
            .and_then(|b| b.append(Tag::WalletsCount, self.slots.len()))
            .expect("read response")
    }

    fn wallet_fields(builder: TlvBuilder, index: usize, slot: Option<&SimWallet>) -> TlvBuilder {
        let builder = builder.append(Tag::WalletIndex, index).expect("index");
        match slot {
            None => builder.append(Tag::Status, 1u8),
            Some(wallet) => builder
                .append(Tag::Status, 2u8)
                .and_then(|b| b.append(Tag::CurveId, wallet.curve.name()))
                .and_then(|b| b.append(Tag::WalletPublicKey, wallet.keys.public_key.as_slice()))
                .and_then(|b| b.append(Tag::WalletSignedHashes, wallet.signed_hashes)),
        }
        .expect("wallet fields")
    }

    fn wallets_list(&self) -> TlvBuilder {
        self.slots
            .iter()
            .enumerate()
            .fold(self.builder(), |builder, (index, slot)| {
                builder
                    .append_nested(
                        Tag::WalletInfo,
                        Self::wallet_fields(TlvBuilder::new(true), index, slot.as_ref()),
                    )
                    .expect("wallet list")
            })
    }

    fn read_wallet(&self, request: &TlvDecoder) -> Result<TlvBuilder, StatusWord> {
        let index = self.wallet_index(request).ok_or(common::WALLET_NOT_FOUND)?;
        let wallet = self.slots[index].as_ref().ok_or(common::WALLET_NOT_FOUND)?;

        let Some(path) = request.decode_optional::<Bytes>(Tag::WalletHdPath).ok().flatten() else {
            return Ok(Self::wallet_fields(self.builder(), index, Some(wallet)));
        };

        // Child keys are a stand-in: deterministic per wallet and path.
        let digest = Sha256::new()
            .chain_update(&wallet.keys.public_key)
            .chain_update(&path)
            .finalize();
        let mut child = BytesMut::from(&[0x02][..]);
        child.extend_from_slice(&digest);
        Ok(self
            .builder()
            .append(Tag::WalletIndex, index)
            .and_then(|b| b.append(Tag::Status, 2u8))
            .and_then(|b| b.append(Tag::WalletPublicKey, child.freeze()))
            .and_then(|b| b.append(Tag::WalletHdChain, Bytes::from(Sha256::digest(&path).to_vec())))
            .expect("derived key"))
    }

    fn create_wallet(&mut self, request: &TlvDecoder) -> Result<TlvBuilder, StatusWord> {
        let index: usize = request
            .decode(Tag::WalletIndex)
            .map_err(|_| common::INVALID_STATE)?;
        if self.slots.get(index).is_none_or(Option::is_some) {
            return Err(common::INVALID_STATE);
        }
        let curve: String = request.decode(Tag::CurveId).map_err(|_| common::INVALID_STATE)?;
        let public_key = self.load_wallet(index, curve.parse().map_err(|_| common::INVALID_STATE)?);

        Ok(self
            .builder()
            .append(Tag::Status, 2u8)
            .and_then(|b| b.append(Tag::WalletIndex, index))
            .and_then(|b| b.append(Tag::WalletPublicKey, public_key))
            .expect("create response"))
    }

    fn sign(&mut self, request: &TlvDecoder) -> Result<TlvBuilder, StatusWord> {
        let index = self.wallet_index(request).ok_or(common::WALLET_NOT_FOUND)?;
        let size: usize = request
            .decode(Tag::TransactionOutHashSize)
            .map_err(|_| common::INVALID_STATE)?;
        let hashes: Bytes = request
            .decode(Tag::TransactionOutHash)
            .map_err(|_| common::INVALID_STATE)?;
        let wallet = self.slots[index].as_mut().ok_or(common::WALLET_NOT_FOUND)?;

        let mut signatures = BytesMut::new();
        for hash in hashes.chunks(size) {
            let signature = SoftwareCrypto
                .sign(wallet.curve, &wallet.keys.private_key, hash)
                .map_err(|_| common::INVALID_STATE)?;
            signatures.extend_from_slice(&signature);
        }
        wallet.signed_hashes += (hashes.len() / size) as u32;

        Ok(self
            .builder()
            .append(Tag::WalletSignature, signatures.freeze())
            .and_then(|b| b.append(Tag::WalletSignedHashes, wallet_signed(&self.slots, index)))
            .expect("sign response"))
    }

    fn attest(&self, request: &TlvDecoder) -> Result<TlvBuilder, StatusWord> {
        let index = self.wallet_index(request).ok_or(common::WALLET_NOT_FOUND)?;
        let wallet = self.slots[index].as_ref().ok_or(common::WALLET_NOT_FOUND)?;
        let challenge: Bytes = request.decode(Tag::Challenge).map_err(|_| common::INVALID_STATE)?;

        let salt = SoftwareCrypto.random_bytes(16);
        let message = [challenge.as_ref(), salt.as_ref()].concat();
        let mut signature = SoftwareCrypto
            .sign(wallet.curve, &wallet.keys.private_key, &message)
            .map_err(|_| common::INVALID_STATE)?
            .to_vec();
        if self.tamper_signatures {
            signature[7] ^= 0x01;
        }

        Ok(self
            .builder()
            .append(Tag::Salt, salt)
            .and_then(|b| b.append(Tag::WalletSignature, signature))
            .expect("attest response"))
    }

    fn link(&mut self, request: &TlvDecoder) -> Result<TlvBuilder, StatusWord> {
        let links = request
            .decode_all::<TlvDecoder>(Tag::BackupCardLink)
            .map_err(|_| common::INVALID_STATE)?;
        for link in links {
            let index: u8 = link.decode(Tag::FileIndex).map_err(|_| common::INVALID_STATE)?;
            let key: Bytes = link
                .decode(Tag::BackupCardLinkingKey)
                .map_err(|_| common::INVALID_STATE)?;
            self.backup_links.push((index, key));
        }
        Ok(self.builder().append(Tag::BackupStatus, 1u8).expect("link response"))
    }

    fn open_session(&mut self, apdu: &CommandApdu, request: &TlvDecoder) -> Outcome {
        let host_half: Bytes = request.decode(Tag::SessionKeyA).map_err(|_| common::INVALID_STATE)?;
        let mut hasher = Sha256::new();
        let card_half = match apdu.encryption_mode() {
            Some(EncryptionMode::Fast) => {
                let nonce = SoftwareCrypto.random_bytes(16);
                hasher.update(self.access_code);
                hasher.update(&host_half);
                hasher.update(&nonce);
                nonce
            }
            Some(EncryptionMode::Strong) => {
                let host_key =
                    PublicKey::from_sec1_bytes(&host_half).map_err(|_| common::INVALID_STATE)?;
                let secret = SecretKey::random(&mut rand_v8::thread_rng());
                let shared = diffie_hellman(secret.to_nonzero_scalar(), host_key.as_affine());
                hasher.update(shared.raw_secret_bytes());
                hasher.update(self.access_code);
                Bytes::copy_from_slice(secret.public_key().to_encoded_point(false).as_bytes())
            }
            _ => return Err(common::INVALID_STATE),
        };
        self.session_key = Some(EncryptionKey::from(<[u8; 32]>::from(hasher.finalize())));

        Ok(TlvBuilder::new(true)
            .append(Tag::SessionKeyB, card_half)
            .and_then(|b| b.serialize())
            .expect("session response"))
    }
}

fn wallet_signed(slots: &[Option<SimWallet>], index: usize) -> u32 {
    slots[index].as_ref().map_or(0, |wallet| wallet.signed_hashes)
}

fn respond(data: Bytes, status: StatusWord) -> Bytes {
    ResponseApdu::new(data, status).to_bytes()
}

impl CardTransport for SimulatedCard {
    fn open(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        self.opens += 1;
        self.session_key = None;
        Ok(())
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::Connection);
        }
        self.exchanges += 1;
        if self.drop_link_at.contains(&self.exchanges) {
            self.connected = false;
            return Err(TransportError::Disconnected);
        }

        if self.pending_delays > 0 {
            self.pending_delays -= 1;
            let pause = TlvBuilder::new(true)
                .append(Tag::Pause, 1u16)
                .and_then(|b| b.serialize())
                .expect("pause");
            return Ok(respond(pause, common::SECURITY_DELAY));
        }

        let mut apdu = CommandApdu::from_bytes(command).ok_or(TransportError::Transmission)?;
        let encrypted = apdu.ins != Instruction::OpenSession
            && apdu.encryption_mode() != Some(EncryptionMode::None);
        if apdu.ins != Instruction::OpenSession && !encrypted && self.require_encryption {
            return Ok(respond(Bytes::new(), common::NEED_ENCRYPTION));
        }
        if encrypted {
            let Some(key) = &self.session_key else {
                return Ok(respond(Bytes::new(), common::NEED_ENCRYPTION));
            };
            apdu.data = key.decrypt(&apdu.data).map_err(|_| TransportError::Transmission)?;
        }

        let outcome = self.handle(&apdu);
        self.processed.push(apdu);
        Ok(match outcome {
            Ok(data) if encrypted => {
                let key = self.session_key.as_ref().ok_or(TransportError::Device)?;
                respond(key.encrypt(&data).map_err(|_| TransportError::Device)?, common::SUCCESS)
            }
            Ok(data) => respond(data, common::SUCCESS),
            Err(status) => respond(Bytes::new(), status),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

/// Session over `card` with the default configuration
pub fn session(card: SimulatedCard) -> CardSession<SimulatedCard> {
    session_with(card, Config::default().with_reconnect(3, 1))
}

pub fn session_with(card: SimulatedCard, config: Config) -> CardSession<SimulatedCard> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    CardSession::new(card, config)
}
