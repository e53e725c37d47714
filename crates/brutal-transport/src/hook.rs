use brutal_core::{ConfigSnapshot, EnforceError, DEFAULT_RATE};
use std::net::SocketAddr;

use crate::enforcer::{enforce, CongestionSocket, Enforcement};

/// The per-request hook, run after the head is read and before any response
/// byte is written.
///
/// Resolves the policy for `host`/`path` in `snapshot` and enforces it on
/// `socket`. The caller decides what an `Err` means for the request.
pub fn before_serving<S>(
    snapshot: &ConfigSnapshot,
    host: Option<&str>,
    path: &str,
    socket: &S,
    peer: SocketAddr,
) -> Result<Enforcement, EnforceError>
where
    S: CongestionSocket + ?Sized,
{
    let chain = snapshot.scopes_for(host, path);
    let policy = chain.resolve();

    if !policy.enabled {
        tracing::info!("Brutal TCP flow control is not enabled for request from {}", peer);
        return Ok(Enforcement::NotApplicable);
    }

    if chain.path.rate.is_none() {
        tracing::warn!(
            "tcp_brutal enabled for {:?}{} without tcp_brutal_rate, pacing at {} bytes/s",
            chain.server_name.unwrap_or("_"),
            chain.location.unwrap_or(""),
            DEFAULT_RATE
        );
    }
    tracing::info!(
        "Brutal TCP flow control is enabled for request from {} with rate {} bytes/s",
        peer,
        policy.rate
    );

    enforce(socket, policy)
}
