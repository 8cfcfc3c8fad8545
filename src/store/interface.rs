//! Local-interface detection for peer lists.
//!
//! A cluster node's own address frequently appears in its configured peer
//! list; querying it would recurse forever. An address is local exactly when
//! this process can bind it, so each candidate is probed across the
//! ephemeral port range once at startup.

use super::store::StoreError;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

/// Whether `host` (optionally `host:port`) resolves to this machine.
///
/// Binding succeeds on some port -> local. `AddrNotAvailable` -> remote.
/// Ports busy for other reasons are skipped; an unresolvable host or a
/// fully exhausted port range indicates a broken environment and is
/// surfaced as fatal.
pub fn is_local_interface(host: &str) -> Result<bool, StoreError> {
    let host = host.split(':').next().unwrap_or(host);

    let probe_error = |source: io::Error| StoreError::InterfaceProbe {
        host: host.to_string(),
        source,
    };

    let ip = (host, 0u16)
        .to_socket_addrs()
        .map_err(&probe_error)?
        .next()
        .ok_or_else(|| {
            probe_error(io::Error::new(
                io::ErrorKind::NotFound,
                "hostname resolved to no addresses",
            ))
        })?
        .ip();

    let mut last_error: Option<io::Error> = None;
    for port in 1025..65535u16 {
        match TcpListener::bind(SocketAddr::new(ip, port)) {
            Ok(listener) => {
                drop(listener);
                return Ok(true);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrNotAvailable => return Ok(false),
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    Err(probe_error(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::Other, "no ports attempted")
    })))
}
