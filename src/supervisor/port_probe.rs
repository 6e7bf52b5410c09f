//! Port probe — bind-then-release check for an already-listening backend.
//!
//! The probe gates every `start()`: if something already answers on the
//! configured port we treat it as an externally started backend instead of
//! spawning a second one. Anything short of a clean successful bind
//! (`AddrInUse`, permission errors, unresolvable host, timeout) counts as
//! "in use"; the supervisor must never double-launch.

use socket2::{Domain, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Upper bound on the whole probe, name resolution included.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Check whether `host:port` already has a listener.
pub async fn is_port_bound(host: &str, port: u16) -> bool {
    let host_owned = host.to_string();
    // 동기 bind/resolve는 blocking 스레드풀에서 수행
    let probe = tokio::task::spawn_blocking(move || probe_blocking(&host_owned, port));

    match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
        Ok(Ok(bound)) => bound,
        Ok(Err(e)) => {
            tracing::warn!("Port probe task failed ({}), treating {}:{} as in use", e, host, port);
            true
        }
        Err(_) => {
            tracing::warn!("Port probe timed out, treating {}:{} as in use", host, port);
            true
        }
    }
}

fn probe_blocking(host: &str, port: u16) -> bool {
    let addr: SocketAddr = match (host, port).to_socket_addrs().ok().and_then(|mut a| a.next()) {
        Some(addr) => addr,
        None => {
            tracing::warn!("Could not resolve '{}', treating port {} as in use", host, port);
            return true;
        }
    };

    let socket = match Socket::new(Domain::for_address(addr), Type::STREAM, None) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Port probe socket creation failed ({}), treating {} as in use", e, addr);
            return true;
        }
    };

    // No SO_REUSEADDR here: the probe has to collide with a live listener.
    match socket.bind(&addr.into()) {
        Ok(_) => false, // bind succeeded, listener released on drop
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => true,
        Err(e) => {
            tracing::warn!("Port probe bind failed ({}), treating {} as in use", e, addr);
            true
        }
    }
}
