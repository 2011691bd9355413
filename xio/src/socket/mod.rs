//! Plain TCP transport and the socket plumbing shared with the TLS adapters.

mod adapter;
mod async_socket;
mod resolver;

pub use self::adapter::SocketAdapter;
pub use self::async_socket::AsyncSocket;
pub use self::resolver::{Resolver, SystemResolver};

pub(crate) use self::async_socket::poll_connect;
