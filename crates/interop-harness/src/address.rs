//! Bind address normalization
//!
//! A server bound to a wildcard address announces that wildcard (`[::]`,
//! `0.0.0.0`). Clients need something they can connect to, so wildcard
//! hosts are rewritten to the IPv4 loopback literal.

use std::net::{IpAddr, Ipv4Addr};

use url::{Host, Url};

/// Given the URI a server reports after binding, return a URI that reaches
/// it over loopback. Non-wildcard hosts are returned unchanged.
pub fn loopback_uri(bound: &Url) -> Url {
    let mut uri = bound.clone();

    let wildcard = match uri.host() {
        Some(Host::Ipv6(ip)) => ip.is_unspecified(),
        Some(Host::Ipv4(ip)) => ip.is_unspecified(),
        _ => false,
    };

    // Only fails for cannot-be-a-base URIs, which never carry an IP host.
    if wildcard && uri.set_ip_host(IpAddr::V4(Ipv4Addr::LOCALHOST)).is_err() {
        return bound.clone();
    }

    uri
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(s: &str) -> String {
        loopback_uri(&Url::parse(s).unwrap()).to_string()
    }

    #[test]
    fn test_ipv6_wildcard_rewritten() {
        assert_eq!(normalize("https://[::]:5001"), "https://127.0.0.1:5001/");
    }

    #[test]
    fn test_ipv4_wildcard_rewritten() {
        assert_eq!(normalize("https://0.0.0.0:5001/"), "https://127.0.0.1:5001/");
    }

    #[test]
    fn test_path_and_port_preserved() {
        assert_eq!(
            normalize("https://[::]:44321/base/path"),
            "https://127.0.0.1:44321/base/path"
        );
    }

    #[test]
    fn test_specific_hosts_untouched() {
        assert_eq!(normalize("https://[::1]:5001/"), "https://[::1]:5001/");
        assert_eq!(normalize("https://127.0.0.1:5001/"), "https://127.0.0.1:5001/");
        assert_eq!(normalize("https://localhost:5001/"), "https://localhost:5001/");
        assert_eq!(normalize("https://10.1.2.3:5001/"), "https://10.1.2.3:5001/");
    }
}
