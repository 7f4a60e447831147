//! Free-port probing.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use log::debug;
use tokio::net::TcpListener;

use crate::server::error::Error;

/// Find the first port at or above `port` that can be bound on the wildcard address.
///
/// Each candidate is tried with a transient probe listener that is closed
/// again immediately. Only "address in use" moves on to the next port; any
/// other bind failure is returned as is.
///
/// The answer is only true at the instant of probing: another process may
/// claim the port before the caller binds it.
pub async fn use_port(port: u16) -> Result<u16, Error> {
    use_port_on(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).await
}

/// [`use_port`] against a specific local address.
pub async fn use_port_on(host: IpAddr, port: u16) -> Result<u16, Error> {
    let mut candidate = port;
    loop {
        match TcpListener::bind(SocketAddr::new(host, candidate)).await {
            Ok(probe) => {
                drop(probe);
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!("Port {candidate} is in use, trying the next one");
                candidate = candidate.checked_add(1).ok_or(Error::PortExhausted(port))?;
            }
            Err(e) => return Err(Error::IoError(e)),
        }
    }
}
