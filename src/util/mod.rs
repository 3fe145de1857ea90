use std::net::{IpAddr, SocketAddr};

use local_ip_address::list_afinet_netifas;
use str0m::{net::Protocol, Candidate};
use tracing::debug;

use crate::engine::EngineError;

/// Gather host ICE candidates for every routable IPv4 interface.
///
/// Iterates the host's network interfaces, skipping loopback and link-local
/// addresses, and builds a UDP host candidate on the given port for each
/// remaining one. Fails with [`EngineError::NoCandidates`] when nothing
/// usable is found, since a peer connection cannot be negotiated without at
/// least one shareable address.
pub(crate) fn gather_host_candidates(port: u16) -> Result<Vec<Candidate>, EngineError> {
    let mut candidates: Vec<Candidate> = vec![];

    if let Ok(network_interfaces) = list_afinet_netifas() {
        for (name, ip) in network_interfaces {
            let IpAddr::V4(ip4) = ip else {
                continue;
            };
            if ip4.is_loopback() || ip4.is_link_local() {
                continue;
            }
            debug!("candidate iface: {} / {:?}", name, ip);

            let socket_addr = SocketAddr::new(ip, port);
            match Candidate::host(socket_addr, Protocol::Udp) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => debug!("skipping candidate for {}: {:?}", socket_addr, e),
            }
        }
    }

    if candidates.is_empty() {
        return Err(EngineError::NoCandidates);
    }

    Ok(candidates)
}
