use std::net::{SocketAddr, TcpStream};

use tracing::{debug, error, warn};

use super::common::TlsAdapterCommon;
use super::TlsEngine;
use crate::adapter::{CreateAdapter, OnBytesReceived, XioAdapter};
use crate::config::EndpointConfig;
use crate::error::*;
use crate::options::{OptionCaps, OptionSet, OptionValue, OPTION_TCP_KEEPALIVE};
use crate::socket::{poll_connect, AsyncSocket, Resolver, SystemResolver};
use crate::types::AsyncResult;

// Only the steps that may take a while need their own poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpeningStep {
    Validate,
    Resolve,
    Connect,
    InitSession,
    Handshake,
    ValidationFailed,
    Failed,
}

/// Creation parameters of [`TlsOverSocketAdapter`].
pub struct TlsParams<E> {
    pub endpoint: EndpointConfig,
    pub engine: E,
}

/// TLS over a socket the adapter creates itself.
///
/// Opening runs VALIDATE, RESOLVE, CONNECT, INIT_SESSION and HANDSHAKE, one
/// step per poll. A failing step releases the session and the socket.
pub struct TlsOverSocketAdapter<E: TlsEngine<Io = TcpStream>, R: Resolver = SystemResolver> {
    common: TlsAdapterCommon<E::Session>,
    engine: E,
    resolver: R,
    step: OpeningStep,
    keep_alive: Option<bool>,
    addr: Option<SocketAddr>,
    socket: Option<AsyncSocket>,
}

impl<E: TlsEngine<Io = TcpStream>, R: Resolver> TlsOverSocketAdapter<E, R> {
    pub fn with_resolver(params: TlsParams<E>, resolver: R) -> Result<Self> {
        let TlsParams { endpoint, engine } = params;
        let caps = engine.option_caps() | OptionCaps::TCP_KEEPALIVE;
        let mut adapter = TlsOverSocketAdapter {
            common: TlsAdapterCommon::new(&endpoint, caps)?,
            engine,
            resolver,
            step: OpeningStep::Validate,
            keep_alive: None,
            addr: None,
            socket: None,
        };
        for (name, value) in endpoint.options.iter() {
            adapter.set_option(name, value)?;
        }
        Ok(adapter)
    }

    fn set_step(&mut self, step: OpeningStep) {
        debug!("tls opening step {:?} -> {:?}", self.step, step);
        self.step = step;
    }

    fn validate(&mut self) {
        match self.common.options.check_consistency() {
            Ok(()) => self.set_step(OpeningStep::Resolve),
            Err(_) => self.set_step(OpeningStep::ValidationFailed),
        }
    }

    fn poll_resolve(&mut self) -> AsyncResult {
        // Failures are retried on the next poll; the resolver logs them.
        if let Ok(Some(addr)) = self.resolver.resolve(&self.common.hostname, self.common.port) {
            self.addr = Some(addr);
            self.set_step(OpeningStep::Connect);
        }
        AsyncResult::Waiting
    }

    fn poll_socket(&mut self) -> AsyncResult {
        let addr = match self.addr {
            Some(addr) => addr,
            None => return AsyncResult::Failure,
        };
        match poll_connect(&mut self.socket, addr, self.keep_alive.unwrap_or(false)) {
            Ok(true) => {
                self.set_step(OpeningStep::InitSession);
                AsyncResult::Waiting
            }
            Ok(false) => AsyncResult::Waiting,
            Err(e) => {
                error!("Could not create socket_async: {}", e);
                AsyncResult::Failure
            }
        }
    }

    fn init_session(&mut self, on_received: &OnBytesReceived) -> AsyncResult {
        let stream = match self.socket.take() {
            Some(socket) => socket.into_stream(),
            None => return AsyncResult::Failure,
        };
        let created = self.engine.create_session(
            &self.common.options,
            &self.common.hostname,
            self.common.port,
            stream,
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

impl<E, R> CreateAdapter for TlsOverSocketAdapter<E, R>
where
    E: TlsEngine<Io = TcpStream>,
    R: Resolver + Default,
{
    type Params = TlsParams<E>;

    fn create(params: TlsParams<E>) -> Result<Self> {
        Self::with_resolver(params, R::default())
    }
}

impl<E: TlsEngine<Io = TcpStream>, R: Resolver> XioAdapter for TlsOverSocketAdapter<E, R> {
    fn open(&mut self, on_received: &OnBytesReceived) -> AsyncResult {
        if self.step == OpeningStep::Validate {
            self.validate();
        }

        let result = match self.step {
            OpeningStep::Resolve => self.poll_resolve(),
            OpeningStep::Connect => self.poll_socket(),
            OpeningStep::InitSession => self.init_session(on_received),
            OpeningStep::Handshake => self.common.handshake(),
            OpeningStep::Validate | OpeningStep::ValidationFailed => AsyncResult::Failure,
            OpeningStep::Failed => {
                error!("Calling open after open failure");
                AsyncResult::Failure
            }
        };

        if result == AsyncResult::Failure {
            self.close();
            if self.step != OpeningStep::ValidationFailed {
                self.set_step(OpeningStep::Failed);
            }
        }
        result
    }

    fn close(&mut self) -> AsyncResult {
        self.common.close();
        self.socket = None;
        AsyncResult::Success
    }

    fn read(&mut self) -> AsyncResult {
        self.common.read()
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.common.write(buffer)
    }

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        if name == OPTION_TCP_KEEPALIVE {
            let keep_alive = value.as_bool().ok_or_else(|| {
                Error::InvalidParameter(format!("{} expects a boolean value", name))
            })?;
            if let Some(ref socket) = self.socket {
                socket.set_keepalive(keep_alive)?;
            } else if self.common.has_session() {
                warn!("tcp_keepalive change takes effect on the next connect");
            }
            self.keep_alive = Some(keep_alive);
            return Ok(());
        }
        self.common.set_option(name, value)
    }

    fn retrieve_options(&self) -> OptionSet {
        let mut options = self.common.retrieve_options();
        if let Some(keep_alive) = self.keep_alive {
            options.push(OPTION_TCP_KEEPALIVE, keep_alive);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OPTION_TRUSTED_CERT, OPTION_X509_CERT, OPTION_X509_PRIVATE_KEY};
    use crate::test::{EngineScript, FakeEngine};
    use std::cell::{Cell, RefCell};
    use std::net::TcpListener;
    use std::rc::Rc;
    use std::thread;
    use std::time::Duration;

    /// Counts lookups and always answers with loopback.
    #[derive(Default)]
    struct CountingResolver {
        calls: Rc<Cell<usize>>,
    }

    impl Resolver for CountingResolver {
        fn resolve(&mut self, _hostname: &str, port: u16) -> Result<Option<SocketAddr>> {
            self.calls.set(self.calls.get() + 1);
            Ok(Some(SocketAddr::from(([127, 0, 0, 1], port))))
        }
    }

    fn adapter(
        port: u16,
        script: &Rc<RefCell<EngineScript>>,
    ) -> (TlsOverSocketAdapter<FakeEngine<TcpStream>, CountingResolver>, Rc<Cell<usize>>) {
        let resolver = CountingResolver::default();
        let calls = resolver.calls.clone();
        let params = TlsParams {
            endpoint: EndpointConfig::new("device.example", port),
            engine: FakeEngine::new(script.clone()),
        };
        (TlsOverSocketAdapter::with_resolver(params, resolver).unwrap(), calls)
    }

    fn poll_open<E, R>(
        adapter: &mut TlsOverSocketAdapter<E, R>,
        on_received: &OnBytesReceived,
    ) -> AsyncResult
    where
        E: TlsEngine<Io = TcpStream>,
        R: Resolver,
    {
        for _ in 0..2000 {
            match adapter.open(on_received) {
                AsyncResult::Waiting => thread::sleep(Duration::from_millis(1)),
                done => return done,
            }
        }
        AsyncResult::Waiting
    }

    #[test]
    fn test_validation_failure_is_terminal() {
        let script = EngineScript::shared();
        let (mut adapter, calls) = adapter(1, &script);
        adapter.set_option(OPTION_X509_CERT, &"cert".into()).unwrap();
        let nop = OnBytesReceived::new(|_| {});

        assert_eq!(adapter.open(&nop), AsyncResult::Failure);
        assert_eq!(adapter.open(&nop), AsyncResult::Failure);
        assert_eq!(adapter.step, OpeningStep::ValidationFailed);
        assert_eq!(calls.get(), 0);
        assert_eq!(script.borrow().sessions, 0);
    }

    #[test]
    fn test_open_runs_every_step() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let script = EngineScript::shared();
        script
            .borrow_mut()
            .handshake
            .extend(vec![AsyncResult::Waiting, AsyncResult::Success]);
        let (mut adapter, calls) = adapter(port, &script);
        adapter.set_option(OPTION_X509_CERT, &"cert".into()).unwrap();
        adapter.set_option(OPTION_X509_PRIVATE_KEY, &"key".into()).unwrap();

        let received = Rc::new(RefCell::new(Vec::new()));
        let r = received.clone();
        let on_received = OnBytesReceived::new(move |b| r.borrow_mut().extend_from_slice(b));

        assert_eq!(adapter.open(&on_received), AsyncResult::Waiting);
        assert_eq!(adapter.step, OpeningStep::Connect);
        assert_eq!(poll_open(&mut adapter, &on_received), AsyncResult::Success);
        let _peer = listener.accept().unwrap();

        assert_eq!(calls.get(), 1);
        {
            let script = script.borrow();
            assert_eq!(script.sessions, 1);
            assert_eq!(script.hostname.as_deref(), Some("device.example"));
            assert_eq!(script.x509_cert.as_deref(), Some("cert"));
        }

        script.borrow_mut().incoming.push_back(b"secret".to_vec());
        assert_eq!(adapter.read(), AsyncResult::Success);
        assert_eq!(adapter.read(), AsyncResult::Waiting);
        assert_eq!(*received.borrow(), b"secret");

        assert_eq!(adapter.write(b"reply").unwrap(), 5);
        assert_eq!(script.borrow().outgoing, b"reply");

        // the stream belongs to the session now; kept for the next connect
        adapter.set_option(OPTION_TCP_KEEPALIVE, &true.into()).unwrap();
        assert_eq!(adapter.keep_alive, Some(true));
        assert_eq!(
            adapter.retrieve_options().get(OPTION_TCP_KEEPALIVE),
            Some(&OptionValue::Bool(true))
        );

        assert_eq!(adapter.close(), AsyncResult::Success);
        assert_eq!(script.borrow().closes, 1);
        assert!(adapter.write(b"late").is_err());
    }

    #[test]
    fn test_handshake_failure_releases_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let script = EngineScript::shared();
        script.borrow_mut().handshake.push_back(AsyncResult::Failure);
        let (mut adapter, _calls) = adapter(port, &script);
        let nop = OnBytesReceived::new(|_| {});

        assert_eq!(poll_open(&mut adapter, &nop), AsyncResult::Failure);
        assert_eq!(script.borrow().sessions, 1);
        assert_eq!(script.borrow().closes, 1);
        assert_eq!(adapter.open(&nop), AsyncResult::Failure);
        assert_eq!(script.borrow().sessions, 1);
        drop(listener);
    }

    #[test]
    fn test_session_creation_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let script = EngineScript::shared();
        script.borrow_mut().fail_create = true;
        let (mut adapter, _calls) = adapter(port, &script);
        let nop = OnBytesReceived::new(|_| {});

        assert_eq!(poll_open(&mut adapter, &nop), AsyncResult::Failure);
        assert_eq!(adapter.step, OpeningStep::Failed);
        assert!(adapter.socket.is_none());
        drop(listener);
    }

    #[test]
    fn test_options_combine_engine_and_socket_caps() {
        let script = EngineScript::shared();
        script.borrow_mut().caps = OptionCaps::TRUSTED_CERTS;
        let (mut adapter, _calls) = adapter(1, &script);

        assert!(matches!(
            adapter.set_option(OPTION_X509_CERT, &"cert".into()),
            Err(Error::UnsupportedOption(_))
        ));
        assert!(matches!(
            adapter.set_option("bogus", &"x".into()),
            Err(Error::UnsupportedOption(_))
        ));
        adapter.set_option(OPTION_TRUSTED_CERT, &"pem".into()).unwrap();
        adapter.set_option(OPTION_TCP_KEEPALIVE, &true.into()).unwrap();

        assert_eq!(
            adapter.retrieve_options(),
            OptionSet::new()
                .with(OPTION_TRUSTED_CERT, "pem")
                .with(OPTION_TCP_KEEPALIVE, true)
        );
    }
}
