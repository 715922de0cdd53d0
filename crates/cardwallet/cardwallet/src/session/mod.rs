//! Card session
//!
//! A [`CardSession`] owns the transport and the [`SessionEnvironment`] for one
//! card interaction. It performs the preflight read, negotiates encryption, and
//! drives every command through the same lifecycle:
//!
//! pre-check, prepare, serialize, encrypt, transmit, decrypt, deserialize,
//! verify, apply.
//!
//! Security delays are waited out and the same frame is sent again. A lost link
//! is re-established with back-off and the command is resent, re-negotiating
//! the session key first when payloads are encrypted.

mod cancel;
mod user_code;

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
pub use cancel::CancellationToken;
use cardwallet_apdu_core::{
    CardTransport, CommandApdu, EncryptionError, EncryptionMode, ResponseApdu, Tag,
    TransportError, response::PAUSE_UNIT,
};
use tracing::{debug, info, instrument, warn};
pub use user_code::UserCodeProvider;

use crate::{
    Card, Config, CryptoProvider, Error, Result, SessionEnvironment, SoftwareCrypto,
    commands::{CardCommand, OpenSessionCommand, PreflightReadMode},
    environment::UserCodeType,
    tasks::{PreflightReadFilter, PreflightReadTask},
};

/// Builds the preflight filter for a freshly read card
pub type PreflightFilterFactory = Arc<dyn Fn(&Card) -> Box<dyn PreflightReadFilter> + Send + Sync>;

/// Observable state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum SessionState {
    /// Ready to start
    #[default]
    #[display("idle")]
    Idle,
    /// Opening the link and reading the card
    #[display("preparing")]
    Preparing,
    /// Running the caller's operation
    #[display("executing")]
    Executing,
    /// The last operation failed
    #[display("failed")]
    Failed,
}

/// Something a session can run: a single command or a multi-step task
pub trait CardSessionRunnable<T: CardTransport> {
    /// Value produced on success
    type Output;

    /// Card state the session must read before running
    fn preflight_read_mode(&self) -> PreflightReadMode;

    /// Run inside `session`
    fn run(&mut self, session: &mut CardSession<T>) -> Result<Self::Output>;
}

impl<T: CardTransport, C: CardCommand> CardSessionRunnable<T> for C {
    type Output = C::Response;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        CardCommand::preflight_read_mode(self)
    }

    fn run(&mut self, session: &mut CardSession<T>) -> Result<Self::Output> {
        session.run_command(self)
    }
}

enum Exchange {
    Response(ResponseApdu),
    Reconnected,
}

/// One interaction with a card over a transport
pub struct CardSession<T: CardTransport> {
    transport: T,
    environment: SessionEnvironment,
    crypto: Box<dyn CryptoProvider>,
    state: SessionState,
    token: CancellationToken,
    access_code_provider: Option<UserCodeProvider>,
    passcode_provider: Option<UserCodeProvider>,
    filter_factory: Option<PreflightFilterFactory>,
}

impl<T: CardTransport> fmt::Debug for CardSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSession")
            .field("transport", &self.transport)
            .field("environment", &self.environment)
            .field("crypto", &self.crypto)
            .field("state", &self.state)
            .field("access_code_provider", &self.access_code_provider)
            .field("passcode_provider", &self.passcode_provider)
            .field("filter_factory", &self.filter_factory.is_some())
            .finish()
    }
}

impl<T: CardTransport> CardSession<T> {
    /// Create a session over `transport`
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            transport,
            environment: SessionEnvironment::new(config),
            crypto: Box::new(SoftwareCrypto),
            state: SessionState::Idle,
            token: CancellationToken::new(),
            access_code_provider: None,
            passcode_provider: None,
            filter_factory: None,
        }
    }

    /// Replace the cryptography implementation
    pub fn with_crypto(mut self, crypto: impl CryptoProvider + 'static) -> Self {
        self.crypto = Box::new(crypto);
        self
    }

    /// Source the access code from `provider` instead of the factory default
    pub fn with_access_code_provider(mut self, provider: impl Into<UserCodeProvider>) -> Self {
        self.environment.clear_user_code(UserCodeType::AccessCode);
        self.access_code_provider = Some(provider.into());
        self
    }

    /// Source the passcode from `provider` instead of the factory default
    pub fn with_passcode_provider(mut self, provider: impl Into<UserCodeProvider>) -> Self {
        self.environment.clear_user_code(UserCodeType::Passcode);
        self.passcode_provider = Some(provider.into());
        self
    }

    /// Install a preflight filter factory
    pub fn with_preflight_filter<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Card) -> Box<dyn PreflightReadFilter> + Send + Sync + 'static,
    {
        self.filter_factory = Some(Arc::new(factory));
        self
    }

    /// Share an existing cancellation token
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token that cancels this session
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current lifecycle state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// State shared by the commands of this session
    pub const fn environment(&self) -> &SessionEnvironment {
        &self.environment
    }

    /// Mutable session state
    pub const fn environment_mut(&mut self) -> &mut SessionEnvironment {
        &mut self.environment
    }

    /// Crypto backend
    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take ownership of the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run `runnable` as the session's operation
    ///
    /// Opens the link, negotiates encryption and performs the preflight read
    /// the runnable asks for. Fails with [`Error::Busy`] while another operation
    /// is in progress.
    #[instrument(level = "debug", skip_all)]
    pub fn start<R: CardSessionRunnable<T>>(&mut self, mut runnable: R) -> Result<R::Output> {
        if matches!(self.state, SessionState::Preparing | SessionState::Executing) {
            return Err(Error::Busy);
        }

        self.token.reset();
        self.state = SessionState::Preparing;
        debug!(state = %self.state, "Session starting");

        let mode = runnable.preflight_read_mode();
        let result = self.prepare_session(mode).and_then(|()| {
            self.state = SessionState::Executing;
            debug!(state = %self.state, "Preflight complete");
            runnable.run(self)
        });

        self.state = match &result {
            Ok(_) | Err(Error::Cancelled) => SessionState::Idle,
            Err(error) => {
                warn!(%error, category = %error.category(), "Session failed");
                SessionState::Failed
            }
        };
        debug!(state = %self.state, "Session finished");
        result
    }

    /// Run a nested runnable inside the current operation, without preflight
    pub fn run<R: CardSessionRunnable<T>>(&mut self, runnable: &mut R) -> Result<R::Output> {
        runnable.run(self)
    }

    /// Close the link and drop the session key
    pub fn close(&mut self) {
        self.environment.set_encryption_key(None);
        self.transport.close();
    }

    fn prepare_session(&mut self, mode: PreflightReadMode) -> Result<()> {
        if !self.transport.is_connected() {
            self.transport.open()?;
        }
        self.establish_encryption()?;

        if !mode.is_satisfied_by(self.environment.card.as_ref()) {
            let mut task = PreflightReadTask::new(mode, self.filter_factory.clone());
            self.run(&mut task)?;
        }
        Ok(())
    }

    fn establish_encryption(&mut self) -> Result<()> {
        let mode = self.environment.encryption_mode();
        if mode == EncryptionMode::None || self.environment.encryption_key().is_some() {
            return Ok(());
        }
        self.run_command(&mut OpenSessionCommand::new(mode))?;
        Ok(())
    }

    fn ensure_user_code(&mut self, kind: UserCodeType) -> Result<()> {
        if self.environment.user_code(kind).is_some() {
            return Ok(());
        }
        let provider = match kind {
            UserCodeType::AccessCode => self.access_code_provider.as_ref(),
            UserCodeType::Passcode => self.passcode_provider.as_ref(),
        };
        // Without a provider the missing code surfaces when the request is built.
        if let Some(provider) = provider {
            let code = provider.request(kind).ok_or(Error::Cancelled)?;
            self.environment.set_user_code(kind, &code);
        }
        Ok(())
    }

    fn forget_rejected_code(&mut self, error: &Error) {
        let (kind, provider) = match error {
            Error::WrongAccessCode => (UserCodeType::AccessCode, &self.access_code_provider),
            Error::WrongPasscode => (UserCodeType::Passcode, &self.passcode_provider),
            _ => return,
        };
        if provider.is_some() {
            debug!(%kind, "Card rejected the code, it will be requested again");
            self.environment.clear_user_code(kind);
        }
    }

    fn frame<C: CardCommand>(&self, command: &C) -> Result<CommandApdu> {
        let apdu = command.serialize(&self.environment)?;
        if !command.is_encrypted() {
            return Ok(apdu);
        }

        apdu.encrypt(
            self.environment.encryption_mode(),
            self.environment.encryption_key(),
        )
        .map_err(|error| match error {
            EncryptionError::MissingKey => Error::MissingEncryptionKey,
            error => error.into(),
        })
    }

    /// Run one command through the full lifecycle
    ///
    /// The environment is only updated once the response was decoded and
    /// verified.
    #[instrument(level = "debug", skip_all, fields(ins = %C::INSTRUCTION))]
    pub fn run_command<C: CardCommand>(&mut self, command: &mut C) -> Result<C::Response> {
        self.token.check()?;

        match self.environment.card.as_ref() {
            Some(card) => command.perform_pre_check(card)?,
            None if command.preflight_read_mode() != PreflightReadMode::None => {
                return Err(Error::MissingPreflightRead);
            }
            None => {}
        }

        command.prepare(&self.environment, self.crypto.as_ref())?;
        if command.requires_access_code() {
            self.ensure_user_code(UserCodeType::AccessCode)?;
        }
        if command.requires_passcode() {
            self.ensure_user_code(UserCodeType::Passcode)?;
        }

        let mut reconnects = 0;
        let response = loop {
            let frame = self.frame(command)?.to_bytes();
            match self.exchange(&frame, &mut reconnects)? {
                Exchange::Response(response) if response.is_success() => break response,
                Exchange::Response(response) => {
                    let error = Error::from_status(response.status(), pause(&response));
                    if matches!(error, Error::NeedEncryption)
                        && command.is_encrypted()
                        && self.environment.encryption_mode() == EncryptionMode::None
                    {
                        warn!("Card requires encryption, switching to fast encryption");
                        self.environment.encryption_mode = EncryptionMode::Fast;
                        self.establish_encryption()?;
                        continue;
                    }
                    self.forget_rejected_code(&error);
                    return Err(error);
                }
                Exchange::Reconnected => {
                    if command.is_encrypted()
                        && self.environment.encryption_mode() != EncryptionMode::None
                    {
                        self.environment.set_encryption_key(None);
                        self.establish_encryption()?;
                    }
                }
            }
        };

        let response = if command.is_encrypted()
            && self.environment.encryption_mode() != EncryptionMode::None
        {
            let key = self
                .environment
                .encryption_key()
                .ok_or(Error::MissingEncryptionKey)?;
            response.decrypt(key)?
        } else {
            response
        };

        let decoded = command.deserialize(&self.environment, &response)?;
        command.verify(&self.environment, &decoded, self.crypto.as_ref())?;
        self.token.check()?;
        command.apply(&mut self.environment, &decoded)?;
        Ok(decoded)
    }

    /// Send `frame` until the card answers with something other than a security
    /// delay
    fn exchange(&mut self, frame: &Bytes, reconnects: &mut u32) -> Result<Exchange> {
        let max_delays = self.environment.config.max_security_delay_attempts;
        let mut delays = 0;

        loop {
            self.token.check()?;
            let raw = match self.transport.transmit_raw(frame) {
                Ok(raw) => raw,
                Err(TransportError::Cancelled) => return Err(Error::Cancelled),
                Err(error) if error.is_retriable() => {
                    self.reconnect(&error, reconnects)?;
                    return Ok(Exchange::Reconnected);
                }
                Err(error) => return Err(error.into()),
            };

            let response = ResponseApdu::from_bytes(&raw)?;
            if !response.status().is_security_delay() {
                return Ok(Exchange::Response(response));
            }

            delays += 1;
            if delays > max_delays {
                warn!(attempts = max_delays, "Security delay did not finish");
                return Err(Error::SecurityDelayTimeout {
                    attempts: max_delays,
                });
            }

            let remaining = response.security_delay().unwrap_or(PAUSE_UNIT);
            info!(
                remaining_ms = remaining.as_millis() as u64,
                attempt = delays,
                "Security delay"
            );
            if self.token.wait_for(remaining) {
                return Err(Error::Cancelled);
            }
        }
    }

    fn reconnect(&mut self, cause: &TransportError, reconnects: &mut u32) -> Result<()> {
        let max = self.environment.config.max_reconnect_attempts;
        let delay = Duration::from_millis(self.environment.config.reconnect_delay_ms);

        loop {
            if *reconnects >= max {
                warn!(attempts = *reconnects, %cause, "Giving up on the card link");
                return Err(Error::ConnectionLost);
            }
            *reconnects += 1;
            warn!(attempt = *reconnects, %cause, "Card link lost, reconnecting");

            if self.token.wait_for(delay) {
                return Err(Error::Cancelled);
            }
            match self.transport.reset() {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retriable() => {
                    debug!(%error, "Reconnect attempt failed");
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

/// Pause reported alongside a status word
fn pause(response: &ResponseApdu) -> Option<Duration> {
    let units: u32 = response.tlv().ok()?.decode_optional(Tag::Pause).ok()??;
    Some(PAUSE_UNIT * units)
}
