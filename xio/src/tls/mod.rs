//! TLS composite adapters.
//!
//! A composite breaks its open into an explicit sequence of opening steps,
//! each of which may take several polls, so that no call blocks while a
//! name is resolved, a socket connects or a handshake completes.

mod common;
mod engine;
mod given_io;
mod with_sockets;

pub use self::engine::{TlsEngine, TlsSession};
pub use self::given_io::{GivenIoParams, TlsOverGivenIoAdapter};
pub use self::with_sockets::{TlsOverSocketAdapter, TlsParams};
