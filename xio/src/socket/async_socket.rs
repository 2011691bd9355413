use std::io;
use std::net::{SocketAddr, TcpStream};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, error};

use crate::error::*;

/// A TCP socket whose connect completes in the background.
#[derive(Debug)]
pub struct AsyncSocket {
    socket: Socket,
    addr: SocketAddr,
}

impl AsyncSocket {
    /// Create a non-blocking socket and start connecting it to `addr`.
    pub fn connect(addr: SocketAddr, keep_alive: bool) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        if keep_alive {
            socket.set_keepalive(true)?;
        }

        match socket.connect(&SockAddr::from(addr)) {
            Ok(()) => {}
            Err(ref e) if connect_in_progress(e) => {}
            Err(e) => {
                error!("Socket connect to {} failed: {}", addr, e);
                return Err(e.into());
            }
        }

        Ok(AsyncSocket { socket, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_keepalive(&self, keep_alive: bool) -> Result<()> {
        self.socket.set_keepalive(keep_alive)?;
        Ok(())
    }

    /// Whether the background connect has finished.
    ///
    /// A connect that failed is reported as `Err(..)`.
    pub fn is_connected(&self) -> Result<bool> {
        if let Some(e) = self.socket.take_error()? {
            return Err(e.into());
        }
        match self.socket.peer_addr() {
            Ok(_) => Ok(true),
            Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Hand over the connected socket. It stays non-blocking.
    pub fn into_stream(self) -> TcpStream {
        self.socket.into()
    }
}

#[cfg(unix)]
fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(not(unix))]
fn connect_in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

/// Drive the CONNECT opening step over `slot`.
///
/// Creates the socket on the first call. `Ok(true)` once connected.
pub(crate) fn poll_connect(
    slot: &mut Option<AsyncSocket>,
    addr: SocketAddr,
    keep_alive: bool,
) -> Result<bool> {
    let socket = match slot.take() {
        Some(socket) => socket,
        None => {
            debug!("Connecting to {}", addr);
            AsyncSocket::connect(addr, keep_alive)?
        }
    };
    let connected = socket.is_connected();
    *slot = Some(socket);
    connected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn wait_connected(slot: &mut Option<AsyncSocket>, addr: SocketAddr) -> Result<bool> {
        for _ in 0..1000 {
            if poll_connect(slot, addr, false)? {
                return Ok(true);
            }
            thread::sleep(Duration::from_millis(1));
        }
        Ok(false)
    }

    #[test]
    fn test_connect_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut slot = None;
        assert!(wait_connected(&mut slot, addr).unwrap());
        let (_peer, _) = listener.accept().unwrap();

        let socket = slot.unwrap();
        assert_eq!(socket.addr(), addr);
        assert_eq!(socket.into_stream().peer_addr().unwrap(), addr);
    }

    #[test]
    fn test_connect_refused() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let mut slot = None;
        assert!(wait_connected(&mut slot, addr).is_err());
    }
}
