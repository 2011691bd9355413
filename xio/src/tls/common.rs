use tracing::error;

use crate::adapter::{OnBytesReceived, RECEIVE_BUFFER_SIZE};
use crate::config::EndpointConfig;
use crate::error::*;
use crate::options::{OptionCaps, OptionSet, OptionStatus, OptionValue, TlsOptions};
use crate::types::AsyncResult;

use super::TlsSession;

/// State every TLS composite keeps once opening has created a session.
pub(crate) struct TlsAdapterCommon<S: TlsSession> {
    pub(crate) hostname: String,
    pub(crate) port: u16,
    pub(crate) options: TlsOptions,
    on_received: Option<OnBytesReceived>,
    session: Option<S>,
}

impl<S: TlsSession> TlsAdapterCommon<S> {
    pub(crate) fn new(config: &EndpointConfig, caps: OptionCaps) -> Result<Self> {
        config.validate().map_err(|e| {
            error!("bad parameter");
            e
        })?;
        Ok(TlsAdapterCommon {
            hostname: config.hostname.clone(),
            port: config.port,
            options: TlsOptions::new(caps),
            on_received: None,
            session: None,
        })
    }

    pub(crate) fn set_open_values(&mut self, session: S, on_received: &OnBytesReceived) {
        self.session = Some(session);
        self.on_received = Some(on_received.clone());
    }

    pub(crate) fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn handshake(&mut self) -> AsyncResult {
        match self.session {
            Some(ref mut session) => session.handshake(),
            None => AsyncResult::Failure,
        }
    }

    /// Tear the session down. Always completes at once.
    pub(crate) fn close(&mut self) -> AsyncResult {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.on_received = None;
        AsyncResult::Success
    }

    pub(crate) fn read(&mut self) -> AsyncResult {
        let session = match self.session {
            Some(ref mut session) => session,
            None => return AsyncResult::Failure,
        };

        let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];
        match session.read(&mut buffer) {
            Ok(0) => AsyncResult::Waiting,
            Ok(n) => {
                if let Some(ref on_received) = self.on_received {
                    on_received.deliver(&buffer[..n.min(RECEIVE_BUFFER_SIZE)]);
                }
                AsyncResult::Success
            }
            Err(e) => {
                error!("TLS read failure: {}", e);
                AsyncResult::Failure
            }
        }
    }

    pub(crate) fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        match self.session {
            Some(ref mut session) => session.write(buffer),
            None => Err(Error::Tls("no open session".into())),
        }
    }

    pub(crate) fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        match self.options.set(name, value)? {
            OptionStatus::Accepted => Ok(()),
            OptionStatus::NotHandled => Err(Error::UnsupportedOption(name.into())),
        }
    }

    pub(crate) fn retrieve_options(&self) -> OptionSet {
        self.options.retrieve()
    }
}
