use tracing::{debug, error};

use super::common::TlsAdapterCommon;
use super::TlsEngine;
use crate::adapter::{CreateAdapter, OnBytesReceived, XioAdapter};
use crate::config::EndpointConfig;
use crate::error::*;
use crate::options::{OptionSet, OptionValue};
use crate::types::AsyncResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpeningStep {
    Validate,
    InitSession,
    Handshake,
    ValidationFailed,
    Failed,
}

/// Creation parameters of [`TlsOverGivenIoAdapter`].
pub struct GivenIoParams<E: TlsEngine> {
    pub endpoint: EndpointConfig,
    pub engine: E,
    /// Already connected transport the session is layered over.
    pub io: E::Io,
}

/// TLS over an I/O value supplied at creation.
///
/// There is nothing to resolve or connect, so opening is VALIDATE,
/// INIT_SESSION and HANDSHAKE. The hostname is still passed to the engine
/// for server identity checks.
pub struct TlsOverGivenIoAdapter<E: TlsEngine> {
    common: TlsAdapterCommon<E::Session>,
    engine: E,
    io: Option<E::Io>,
    step: OpeningStep,
}

impl<E: TlsEngine> TlsOverGivenIoAdapter<E> {
    fn set_step(&mut self, step: OpeningStep) {
        debug!("tls opening step {:?} -> {:?}", self.step, step);
        self.step = step;
    }

    fn init_session(&mut self, on_received: &OnBytesReceived) -> AsyncResult {
        let io = match self.io.take() {
            Some(io) => io,
            None => return AsyncResult::Failure,
        };
        let created = self.engine.create_session(
            &self.common.options,
            &self.common.hostname,
            self.common.port,
            io,
        );
        match created {
            Ok(session) => {
                self.common.set_open_values(session, on_received);
                self.set_step(OpeningStep::Handshake);
                AsyncResult::Waiting
            }
            Err(e) => {
                error!("Failed to create TLS session: {}", e);
                AsyncResult::Failure
            }
        }
    }
}

impl<E: TlsEngine> CreateAdapter for TlsOverGivenIoAdapter<E> {
    type Params = GivenIoParams<E>;

    fn create(params: GivenIoParams<E>) -> Result<Self> {
        let GivenIoParams {
            endpoint,
            engine,
            io,
        } = params;
        let caps = engine.option_caps();
        let mut adapter = TlsOverGivenIoAdapter {
            common: TlsAdapterCommon::new(&endpoint, caps)?,
            engine,
            io: Some(io),
            step: OpeningStep::Validate,
        };
        for (name, value) in endpoint.options.iter() {
            adapter.set_option(name, value)?;
        }
        Ok(adapter)
    }
}

impl<E: TlsEngine> XioAdapter for TlsOverGivenIoAdapter<E> {
    fn open(&mut self, on_received: &OnBytesReceived) -> AsyncResult {
        if self.step == OpeningStep::Validate {
            let next = match self.common.options.check_consistency() {
                Ok(()) => OpeningStep::InitSession,
                Err(_) => OpeningStep::ValidationFailed,
            };
            self.set_step(next);
        }

        let result = match self.step {
            OpeningStep::InitSession => self.init_session(on_received),
            OpeningStep::Handshake => self.common.handshake(),
            OpeningStep::Validate | OpeningStep::ValidationFailed => AsyncResult::Failure,
            OpeningStep::Failed => {
                error!("Calling open after open failure");
                AsyncResult::Failure
            }
        };

        if result == AsyncResult::Failure {
            self.common.close();
            self.io = None;
            if self.step != OpeningStep::ValidationFailed {
                self.set_step(OpeningStep::Failed);
            }
        }
        result
    }

    fn close(&mut self) -> AsyncResult {
        self.common.close()
    }

    fn read(&mut self) -> AsyncResult {
        self.common.read()
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.common.write(buffer)
    }

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        self.common.set_option(name, value)
    }

    fn retrieve_options(&self) -> OptionSet {
        self.common.retrieve_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OPTION_X509_ECC_CERT, OPTION_X509_ECC_KEY, OPTION_X509_PRIVATE_KEY};
    use crate::state::IoStateMachine;
    use crate::test::{EngineScript, FakeEngine};
    use crate::types::{OpenResult, SendResult, XioState};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn params(io: &str, script: &Rc<RefCell<EngineScript>>) -> GivenIoParams<FakeEngine<String>> {
        GivenIoParams {
            endpoint: EndpointConfig::new("broker.example", 8883),
            engine: FakeEngine::new(script.clone()),
            io: io.to_string(),
        }
    }

    #[test]
    fn test_open_skips_network_steps() {
        let script = EngineScript::shared();
        let mut adapter = TlsOverGivenIoAdapter::create(params("pipe", &script)).unwrap();
        let nop = OnBytesReceived::new(|_| {});

        assert_eq!(adapter.open(&nop), AsyncResult::Waiting);
        assert_eq!(adapter.step, OpeningStep::Handshake);
        assert_eq!(adapter.open(&nop), AsyncResult::Success);

        let script = script.borrow();
        assert_eq!(script.ios, vec!["\"pipe\""]);
        assert_eq!(script.hostname.as_deref(), Some("broker.example"));
    }

    #[test]
    fn test_key_without_cert_fails_validation() {
        let script = EngineScript::shared();
        let endpoint = EndpointConfig::new("broker.example", 8883)
            .with_option(OPTION_X509_PRIVATE_KEY, "key");
        let mut adapter = TlsOverGivenIoAdapter::create(GivenIoParams {
            endpoint,
            engine: FakeEngine::<String>::new(script.clone()),
            io: "pipe".to_string(),
        })
        .unwrap();
        let nop = OnBytesReceived::new(|_| {});

        assert_eq!(adapter.open(&nop), AsyncResult::Failure);
        assert_eq!(adapter.open(&nop), AsyncResult::Failure);
        assert_eq!(script.borrow().sessions, 0);
    }

    #[test]
    fn test_conflicting_credentials_rejected_at_create() {
        let script = EngineScript::shared();
        let endpoint = EndpointConfig::new("broker.example", 8883)
            .with_option(OPTION_X509_PRIVATE_KEY, "rsa key")
            .with_option(OPTION_X509_ECC_CERT, "ecc cert");
        let created = TlsOverGivenIoAdapter::create(GivenIoParams {
            endpoint,
            engine: FakeEngine::<String>::new(script),
            io: "pipe".to_string(),
        });
        assert!(matches!(created, Err(Error::OptionConflict(_))));
    }

    #[test]
    fn test_session_failure_drops_io() {
        let script = EngineScript::shared();
        script.borrow_mut().fail_create = true;
        let mut adapter = TlsOverGivenIoAdapter::create(params("pipe", &script)).unwrap();
        let nop = OnBytesReceived::new(|_| {});

        assert_eq!(adapter.open(&nop), AsyncResult::Failure);
        assert!(adapter.io.is_none());
        assert_eq!(adapter.open(&nop), AsyncResult::Failure);
        assert_eq!(adapter.step, OpeningStep::Failed);
    }

    #[test]
    fn test_state_machine_over_tls() {
        let script = EngineScript::shared();
        script.borrow_mut().handshake.push_back(AsyncResult::Waiting);
        script.borrow_mut().incoming.push_back(b"hello".to_vec());
        type Adapter = TlsOverGivenIoAdapter<FakeEngine<String>>;
        let mut xio = IoStateMachine::create::<Adapter>(params("pipe", &script)).unwrap();
        xio.set_option(OPTION_X509_ECC_CERT, &"cert".into()).unwrap();
        xio.set_option(OPTION_X509_ECC_KEY, &"key".into()).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let (e1, e2) = (events.clone(), events.clone());
        xio.open(
            move |r| assert_eq!(r, OpenResult::Ok),
            move |b| e1.borrow_mut().push(String::from_utf8_lossy(b).into_owned()),
            || panic!("no io error expected"),
        )
        .unwrap();
        while xio.state() == XioState::Opening {
            xio.dowork();
        }
        assert_eq!(xio.state(), XioState::Open);

        xio.send(b"ping", move |r| {
            e2.borrow_mut().push(format!("{:?}", r));
            assert_eq!(r, SendResult::Ok);
        })
        .unwrap();
        xio.dowork();
        assert_eq!(*events.borrow(), vec!["Ok", "hello"]);
        assert_eq!(script.borrow().outgoing, b"ping");

        assert_eq!(
            xio.retrieve_options(),
            OptionSet::new()
                .with(OPTION_X509_ECC_CERT, "cert")
                .with(OPTION_X509_ECC_KEY, "key")
        );

        xio.close(|| {}).unwrap();
        assert_eq!(xio.state(), XioState::Closed);
        assert_eq!(script.borrow().closes, 1);
    }
}
