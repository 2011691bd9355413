use std::net::{SocketAddr, ToSocketAddrs};

use tracing::debug;

use crate::error::*;

/// Host name lookup used by the RESOLVE opening step.
///
/// `Ok(None)` and `Err(..)` both mean "not yet"; the caller keeps the step
/// and asks again on its next poll.
pub trait Resolver {
    fn resolve(&mut self, hostname: &str, port: u16) -> Result<Option<SocketAddr>>;
}

/// Resolver backed by the operating system, preferring IPv4 addresses.
///
/// The lookup goes through `getaddrinfo` and blocks the calling thread
/// until the system resolver answers. Supply another [`Resolver`] where a
/// slow DNS server must not stall `dowork`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&mut self, hostname: &str, port: u16) -> Result<Option<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (hostname, port)
            .to_socket_addrs()
            .map_err(|e| {
                debug!("Lookup of '{}' failed: {}", hostname, e);
                Error::Resolve(hostname.into())
            })?
            .collect();

        Ok(addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_literal() {
        let addr = SystemResolver.resolve("127.0.0.1", 4711).unwrap();
        assert_eq!(addr, Some("127.0.0.1:4711".parse().unwrap()));
    }

    #[test]
    fn test_resolve_invalid_name() {
        let e = SystemResolver.resolve("not a host name", 1);
        assert!(matches!(e, Err(Error::Resolve(_))));
    }
}
