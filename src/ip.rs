//! Client identity extraction and address classification.

use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Identity used when no header or peer address is available
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client identity for a request.
///
/// Preference order: first non-empty `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the transport peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, FORWARDED_FOR) {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some(real_ip) = header_str(headers, REAL_IP) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse `ip` and return it only if it is worth sending to a geo service.
///
/// Unparseable input, loopback and private or link-local ranges yield `None`.
pub fn public_ip(ip: &str) -> Option<IpAddr> {
    let addr: IpAddr = ip.trim().parse().ok()?;
    if is_private(&addr) {
        None
    } else {
        Some(addr)
    }
}

/// Loopback, RFC 1918 private, or 169.254/16 link-local.
///
/// IPv4-mapped IPv6 addresses are classified by their IPv4 form.
pub fn is_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(&v4),
            None => v6.is_loopback(),
        },
    }
}

fn is_private_v4(v4: &Ipv4Addr) -> bool {
    v4.is_loopback() || v4.is_private() || v4.is_link_local()
}
