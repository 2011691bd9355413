use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use socket2::SockRef;
use tracing::{debug, error, info};

use super::{poll_connect, AsyncSocket, Resolver, SystemResolver};
use crate::adapter::{CreateAdapter, OnBytesReceived, XioAdapter, RECEIVE_BUFFER_SIZE};
use crate::config::EndpointConfig;
use crate::error::*;
use crate::options::{OptionSet, OptionValue, OPTION_TCP_KEEPALIVE};
use crate::types::AsyncResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpeningStep {
    Resolve,
    Connect,
    Open,
    Failed,
}

/// Unencrypted TCP transport.
///
/// Opening resolves the host name, then waits for a non-blocking connect.
/// Reads pull at most [`RECEIVE_BUFFER_SIZE`] bytes at a time.
pub struct SocketAdapter<R: Resolver = SystemResolver> {
    hostname: String,
    port: u16,
    keep_alive: Option<bool>,
    resolver: R,
    step: OpeningStep,
    addr: Option<SocketAddr>,
    connecting: Option<AsyncSocket>,
    stream: Option<TcpStream>,
    on_received: Option<OnBytesReceived>,
}

impl<R: Resolver> SocketAdapter<R> {
    /// Like [`CreateAdapter::create`], with a caller supplied resolver.
    pub fn with_resolver(config: EndpointConfig, resolver: R) -> Result<Self> {
        config.validate()?;
        let mut adapter = SocketAdapter {
            hostname: config.hostname,
            port: config.port,
            keep_alive: None,
            resolver,
            step: OpeningStep::Resolve,
            addr: None,
            connecting: None,
            stream: None,
            on_received: None,
        };
        for (name, value) in config.options.iter() {
            adapter.set_option(name, value)?;
        }
        Ok(adapter)
    }

    fn set_step(&mut self, step: OpeningStep) {
        debug!("socket opening step {:?} -> {:?}", self.step, step);
        self.step = step;
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.connecting = None;
        self.on_received = None;
    }

    fn poll_resolve(&mut self) -> AsyncResult {
        match self.resolver.resolve(&self.hostname, self.port) {
            Ok(Some(addr)) => {
                self.addr = Some(addr);
                self.set_step(OpeningStep::Connect);
            }
            Ok(None) => {}
            Err(e) => debug!("Still resolving '{}': {}", self.hostname, e),
        }
        AsyncResult::Waiting
    }

    fn poll_socket(&mut self, on_received: &OnBytesReceived) -> AsyncResult {
        let addr = match self.addr {
            Some(addr) => addr,
            None => return AsyncResult::Failure,
        };
        let keep_alive = self.keep_alive.unwrap_or(false);

        match poll_connect(&mut self.connecting, addr, keep_alive) {
            Ok(true) => {
                if let Some(socket) = self.connecting.take() {
                    self.stream = Some(socket.into_stream());
                }
                self.on_received = Some(on_received.clone());
                self.set_step(OpeningStep::Open);
                AsyncResult::Success
            }
            Ok(false) => AsyncResult::Waiting,
            Err(e) => {
                error!("Could not connect socket to {}: {}", addr, e);
                AsyncResult::Failure
            }
        }
    }
}

impl<R: Resolver + Default> CreateAdapter for SocketAdapter<R> {
    type Params = EndpointConfig;

    fn create(config: EndpointConfig) -> Result<Self> {
        Self::with_resolver(config, R::default())
    }
}

impl<R: Resolver> XioAdapter for SocketAdapter<R> {
    fn open(&mut self, on_received: &OnBytesReceived) -> AsyncResult {
        let result = match self.step {
            OpeningStep::Resolve => self.poll_resolve(),
            OpeningStep::Connect => self.poll_socket(on_received),
            OpeningStep::Open => AsyncResult::Success,
            OpeningStep::Failed => {
                error!("Calling open after open failure");
                AsyncResult::Failure
            }
        };

        if result == AsyncResult::Failure {
            self.release();
            self.set_step(OpeningStep::Failed);
        }
        result
    }

    fn close(&mut self) -> AsyncResult {
        self.release();
        AsyncResult::Success
    }

    fn read(&mut self) -> AsyncResult {
        let stream = match self.stream {
            Some(ref mut stream) => stream,
            None => return AsyncResult::Failure,
        };

        let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];
        match stream.read(&mut buffer) {
            Ok(0) => {
                info!("Socket closed by peer");
                AsyncResult::Failure
            }
            Ok(n) => {
                if let Some(ref on_received) = self.on_received {
                    on_received.deliver(&buffer[..n]);
                }
                AsyncResult::Success
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                AsyncResult::Waiting
            }
            Err(e) => {
                info!("Socket read failed: {}", e);
                AsyncResult::Failure
            }
        }
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        let stream = match self.stream {
            Some(ref mut stream) => stream,
            None => return Err(Error::Io(io::ErrorKind::NotConnected.into())),
        };

        match stream.write(buffer) {
            Ok(n) => Ok(n),
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        if name != OPTION_TCP_KEEPALIVE {
            return Err(Error::UnsupportedOption(name.into()));
        }
        let keep_alive = value.as_bool().ok_or_else(|| {
            Error::InvalidParameter(format!("{} expects a boolean value", name))
        })?;

        if let Some(ref stream) = self.stream {
            SockRef::from(stream).set_keepalive(keep_alive)?;
        }
        self.keep_alive = Some(keep_alive);
        Ok(())
    }

    fn retrieve_options(&self) -> OptionSet {
        let mut options = OptionSet::new();
        if let Some(keep_alive) = self.keep_alive {
            options.push(OPTION_TCP_KEEPALIVE, keep_alive);
        }
        options
    }
}
