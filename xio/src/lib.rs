//! Poll driven, non-blocking transport IO.
//!
//! The center of this crate is [`IoStateMachine`], which turns any
//! [`XioAdapter`] into an object with `open`, `send` and `close`
//! operations. Every slow sub-operation is split into repeated
//! non-blocking polls, and all progress is made by the caller invoking
//! [`IoStateMachine::dowork`], so a single thread can drive many
//! connections without ever blocking.
//!
//! Adapters provided here:
//!
//! - [`SocketAdapter`]: plain TCP.
//! - [`TlsOverSocketAdapter`]: TLS over a TCP socket it creates itself.
//! - [`TlsOverGivenIoAdapter`]: TLS over an already connected I/O value.
//!
//! The TLS adapters drive a [`TlsEngine`], which wraps the actual TLS
//! library.
//!
//! # Example
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use xio::{EndpointConfig, IoStateMachine, SocketAdapter, XioState};
//!
//! let config = EndpointConfig::from_json(r#"{ "hostname": "localhost", "port": 7 }"#)?;
//! let mut xio = IoStateMachine::create::<SocketAdapter>(config)?;
//!
//! let echoed = Rc::new(RefCell::new(Vec::new()));
//! let sink = echoed.clone();
//! xio.open(
//!     |result| println!("open: {:?}", result),
//!     move |bytes| sink.borrow_mut().extend_from_slice(bytes),
//!     || eprintln!("connection lost"),
//! )?;
//!
//! while xio.state() == XioState::Opening {
//!     xio.dowork();
//! }
//! xio.send(b"ping", |result| println!("send: {:?}", result))?;
//! while echoed.borrow().len() < 4 && xio.state() == XioState::Open {
//!     xio.dowork();
//! }
//! xio.close(|| println!("closed"))?;
//! # Ok::<(), xio::Error>(())
//! ```
//!
//! Nothing in this crate is `Send`: a state machine and everything it owns
//! stay on the thread that created them.

pub use crate::adapter::{CreateAdapter, OnBytesReceived, XioAdapter, RECEIVE_BUFFER_SIZE};
pub use crate::config::EndpointConfig;
pub use crate::error::{Error, Result};
pub use crate::options::{
    OptionCaps, OptionSet, OptionStatus, OptionValue, TlsOptions, X509Type, OPTION_TCP_KEEPALIVE,
    OPTION_TRUSTED_CERT, OPTION_X509_CERT, OPTION_X509_ECC_CERT, OPTION_X509_ECC_KEY,
    OPTION_X509_PRIVATE_KEY,
};
pub use crate::socket::{AsyncSocket, Resolver, SocketAdapter, SystemResolver};
pub use crate::state::IoStateMachine;
pub use crate::tls::{
    GivenIoParams, TlsEngine, TlsOverGivenIoAdapter, TlsOverSocketAdapter, TlsParams, TlsSession,
};
pub use crate::types::{AsyncResult, OpenResult, SendResult, XioState};

mod adapter;
mod config;
mod error;
mod options;
mod pending;
mod socket;
mod state;
mod tls;
mod types;
