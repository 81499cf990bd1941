//! SSRF protection for scraped image URLs.
//!
//! Image locations come from third-party HTML, so every host is resolved
//! and each answer must be a public address before the image is requested.

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;
use url::Url;

/// Ranges not covered by the std `is_*` predicates.
static EXTRA_RESERVED: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    ["100.64.0.0/10", "192.0.0.0/24", "198.18.0.0/15", "240.0.0.0/4", "fc00::/7", "fe80::/10", "64:ff9b:1::/48"]
        .iter()
        .filter_map(|net| net.parse().ok())
        .collect()
});

/// Why an image URL was refused before any request was made.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SsrfError {
    #[error("blocked IP: {0} (private/reserved)")]
    BlockedIp(IpAddr),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("DNS resolution failed: {0}")]
    DnsError(String),
}

/// Whether `ip` is loopback, private, link-local, multicast, unspecified or
/// otherwise not routable on the public internet.
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    let std_reserved = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(mapped) => return is_private_or_reserved(IpAddr::V4(mapped)),
            None => v6.is_loopback() || v6.is_multicast() || v6.is_unspecified(),
        },
    };
    std_reserved || EXTRA_RESERVED.iter().any(|net| net.contains(&ip))
}

/// Reject a single resolved address.
///
/// # Errors
///
/// Returns `SsrfError::BlockedIp` when [`is_private_or_reserved`] holds.
pub fn validate_ip(ip: IpAddr) -> Result<(), SsrfError> {
    if is_private_or_reserved(ip) { Err(SsrfError::BlockedIp(ip)) } else { Ok(()) }
}

/// Resolve the host of `url` and reject it if any answer is non-public.
pub async fn check_url(url: &Url) -> Result<(), SsrfError> {
    let host = url.host_str().ok_or_else(|| SsrfError::MissingHost(url.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = host.parse::<IpAddr>() {
        return validate_ip(ip);
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let answers = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| SsrfError::DnsError(format!("{host}: {e}")))?;

    let mut resolved = 0;
    for addr in answers {
        validate_ip(addr.ip())?;
        resolved += 1;
    }
    if resolved == 0 {
        return Err(SsrfError::DnsError(format!("{host}: no addresses")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_private_v4() {
        for ip in [[127, 0, 0, 1], [10, 1, 2, 3], [172, 16, 0, 1], [192, 168, 1, 1], [169, 254, 0, 1], [0, 0, 0, 1]] {
            assert!(is_private_or_reserved(IpAddr::V4(Ipv4Addr::from(ip))), "{ip:?}");
        }
    }

    #[test]
    fn test_carrier_grade_nat_blocked() {
        assert!(is_private_or_reserved(IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1))));
        assert!(is_private_or_reserved(IpAddr::V4(Ipv4Addr::new(198, 18, 0, 1))));
    }

    #[test]
    fn test_private_v6() {
        assert!(is_private_or_reserved(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_private_or_reserved(IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1))));
        assert!(is_private_or_reserved(IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))));
        assert!(is_private_or_reserved(IpAddr::V6(Ipv4Addr::new(192, 168, 0, 1).to_ipv6_mapped())));
    }

    #[test]
    fn test_public_allowed() {
        assert!(validate_ip(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))).is_ok());
        assert!(validate_ip(IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888))).is_ok());
    }

    #[tokio::test]
    async fn test_check_url_ip_literal() {
        let url = Url::parse("http://127.0.0.1:8080/strip.png").unwrap();
        assert!(matches!(check_url(&url).await, Err(SsrfError::BlockedIp(_))));

        let url = Url::parse("http://[::1]/strip.png").unwrap();
        assert!(matches!(check_url(&url).await, Err(SsrfError::BlockedIp(_))));
    }

    #[tokio::test]
    async fn test_check_url_localhost_name() {
        let url = Url::parse("http://localhost/strip.png").unwrap();
        assert!(check_url(&url).await.is_err());
    }
}
