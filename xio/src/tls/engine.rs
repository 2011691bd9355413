use crate::error::*;
use crate::options::{OptionCaps, TlsOptions};
use crate::types::AsyncResult;

/// A TLS implementation the composite adapters can drive.
///
/// Concrete engines wrap a TLS library; this crate only needs sessions to
/// be created over an already connected I/O value and then polled.
pub trait TlsEngine {
    /// The transport a session is layered over.
    type Io;
    type Session: TlsSession;

    /// Which TLS options this engine understands.
    fn option_caps(&self) -> OptionCaps;

    /// Build a session bound to `io`. Must not block; the handshake runs
    /// later through [`TlsSession::handshake`].
    fn create_session(
        &mut self,
        options: &TlsOptions,
        hostname: &str,
        port: u16,
        io: Self::Io,
    ) -> Result<Self::Session>;
}

/// One TLS connection, polled like an adapter.
pub trait TlsSession {
    /// Advance the handshake. `Success` once the session can carry data.
    fn handshake(&mut self) -> AsyncResult;

    /// Decrypt into `buffer`. `Ok(0)` means nothing is available yet.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Encrypt and queue `buffer`, returning how many bytes were taken.
    fn write(&mut self, buffer: &[u8]) -> Result<usize>;

    /// Send the close notification and release the transport.
    fn close(&mut self);
}
