//! Client identity resolution.
//!
//! # Design Decisions
//! - Forwarded headers are read only when the immediate peer is a
//!   configured trusted proxy; otherwise the socket address is the identity
//! - `X-Forwarded-For` is walked right to left and the first hop that is not
//!   itself a trusted proxy is the client. Hops further left are client
//!   supplied and ignored
//! - A hop that does not parse ends the walk and the peer address is used

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use ipnet::IpNet;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Parse a trusted proxy entry: a CIDR (`10.0.0.0/8`) or a single address.
pub fn parse_trusted_proxy(entry: &str) -> Option<IpNet> {
    let entry = entry.trim();
    entry
        .parse::<IpNet>()
        .ok()
        .or_else(|| entry.parse::<IpAddr>().ok().map(IpNet::from))
}

fn parse_hop(hop: &str) -> Option<IpAddr> {
    let hop = hop.trim();
    hop.parse::<IpAddr>()
        .ok()
        .or_else(|| hop.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .or_else(|| {
            hop.strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|inner| inner.parse().ok())
        })
}

/// The set of peers allowed to speak for clients.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    nets: Vec<IpNet>,
}

impl TrustedProxies {
    /// Build from config entries, skipping ones that do not parse.
    pub fn new(entries: &[String]) -> Self {
        let nets = entries
            .iter()
            .filter_map(|entry| {
                let parsed = parse_trusted_proxy(entry);
                if parsed.is_none() {
                    tracing::warn!(entry = %entry, "Ignoring invalid trusted proxy entry");
                }
                parsed
            })
            .collect();
        Self { nets }
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(&ip))
    }

    /// Resolve the client address for a request arriving from `peer`.
    pub fn client_ip(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        if !self.is_trusted(peer) {
            return peer;
        }

        let hops: Vec<&str> = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .collect();

        let mut leftmost_trusted = None;
        for hop in hops.iter().rev() {
            match parse_hop(hop) {
                Some(ip) if !self.is_trusted(ip) => return ip,
                Some(ip) => leftmost_trusted = Some(ip),
                None => return peer,
            }
        }
        leftmost_trusted.unwrap_or(peer)
    }

    /// The `X-Forwarded-Proto` value, only when `peer` is trusted.
    pub fn forwarded_proto<'h>(&self, peer: IpAddr, headers: &'h HeaderMap) -> Option<&'h str> {
        if !self.is_trusted(peer) {
            return None;
        }
        headers.get(X_FORWARDED_PROTO)?.to_str().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxies() -> TrustedProxies {
        TrustedProxies::new(&["10.0.0.0/8".to_string(), "192.168.1.1".to_string()])
    }

    fn xff(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn untrusted_peer_headers_are_ignored() {
        let peer: IpAddr = "203.0.113.9".parse().unwrap();
        assert_eq!(proxies().client_ip(peer, &xff("1.1.1.1")), peer);
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
        assert_eq!(proxies().forwarded_proto(peer, &headers), None);
    }

    #[test]
    fn rightmost_untrusted_hop_wins() {
        let peer: IpAddr = "10.0.0.5".parse().unwrap();
        let headers = xff("6.6.6.6, 198.51.100.7, 10.1.2.3");
        assert_eq!(
            proxies().client_ip(peer, &headers),
            "198.51.100.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn garbage_hop_falls_back_to_peer() {
        let peer: IpAddr = "192.168.1.1".parse().unwrap();
        assert_eq!(proxies().client_ip(peer, &xff("1.1.1.1, bogus")), peer);
    }

    #[test]
    fn all_trusted_chain_uses_leftmost() {
        let peer: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(
            proxies().client_ip(peer, &xff("10.9.9.9, 10.0.0.4")),
            "10.9.9.9".parse::<IpAddr>().unwrap()
        );
        assert_eq!(proxies().client_ip(peer, &HeaderMap::new()), peer);
    }

    #[test]
    fn hops_with_ports_parse() {
        let peer: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(
            proxies().client_ip(peer, &xff("198.51.100.7:4711")),
            "198.51.100.7".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            proxies().client_ip(peer, &xff("[2001:db8::1]")),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn proxy_entries_parse() {
        assert!(parse_trusted_proxy("10.0.0.0/8").is_some());
        assert!(parse_trusted_proxy("::1").is_some());
        assert!(parse_trusted_proxy("localhost").is_none());
    }
}
