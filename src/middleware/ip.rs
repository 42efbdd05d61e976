//! Client IP extraction.
//!
//! The client IP is the first comma-separated value of `X-Forwarded-For`
//! when that header carries one, otherwise the address of the TCP peer as
//! recorded by axum's `ConnectInfo<SocketAddr>` extension.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **`X-Forwarded-For` is client-controlled.** Since the whitelist gate grants
//! access (and the token endpoint grants *identity*) based on this value, the
//! service must sit behind a reverse proxy that overwrites the header:
//!
//! ```nginx
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! and must not be reachable directly. Without that, any client can claim a
//! whitelisted address.
//!
//! # Canonical Form
//!
//! Values that parse as IP literals are returned in canonical textual form
//! (IPv6 compressed, IPv4-mapped IPv6 peers unwrapped to IPv4) so they compare
//! equal to stored entries. Values that do not parse are passed through
//! trimmed; they can never match a whitelist entry.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;

use crate::validation::canonical_ip;

/// Header consulted before the connection address.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// The resolved client IP, attached to requests that pass the whitelist gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the client IP came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractedIp<'a> {
    /// First entry of X-Forwarded-For
    FromXff(&'a str),
    /// TCP peer address
    FromConnection(IpAddr),
    NotFound,
}

fn extract_ip<B>(req: &Request<B>) -> ExtractedIp<'_> {
    // Format: "client, proxy1, proxy2" - we want the first (client) IP.
    // An empty header counts as absent.
    if let Some(forwarded) = req.headers().get(FORWARDED_FOR_HEADER)
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next().map(str::trim)
        && !first_ip.is_empty()
    {
        return ExtractedIp::FromXff(first_ip);
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return ExtractedIp::FromConnection(addr.ip().to_canonical());
    }

    ExtractedIp::NotFound
}

/// Derive the client IP for a request.
///
/// Returns `None` when there is neither a usable `X-Forwarded-For` value nor
/// connection info.
pub fn extract_client_ip<B>(req: &Request<B>) -> Option<ClientIp> {
    match extract_ip(req) {
        ExtractedIp::FromXff(raw) => Some(ClientIp(
            canonical_ip(raw).unwrap_or_else(|| raw.to_string()),
        )),
        ExtractedIp::FromConnection(ip) => Some(ClientIp(ip.to_string())),
        ExtractedIp::NotFound => None,
    }
}
