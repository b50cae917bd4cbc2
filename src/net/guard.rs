//! SSRF protection for remote dataset fetches.
//!
//! A dataset's source URL is attacker-influenced data: anyone who can edit
//! a manifest can point a fetch at internal infrastructure. Before any
//! request is issued the target URL must pass [`is_public_url`], and the
//! same check runs again on every redirect target.
//!
//! The check fails closed: anything that is not an `http`/`https` URL with
//! a hostname resolving exclusively to public addresses is rejected.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs as _};

use tracing::warn;
use url::{Host, Url};

/// Hostname-to-address resolution, injectable for tests.
pub trait ResolveHost {
    fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl ResolveHost for SystemResolver {
    fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        Ok((host, 0)
            .to_socket_addrs()?
            .map(|addr| addr.ip())
            .collect())
    }
}

/// Whether a URL points to a public internet resource.
///
/// Rejections (all logged):
/// - schemes other than `http` / `https` (`file://`, `ftp://`, ...);
/// - URLs without a hostname;
/// - hostnames that fail to resolve;
/// - hostnames where *any* resolved address is private, loopback, or
///   link-local (IPv4 RFC1918 ranges, 127.0.0.0/8, 169.254.0.0/16; IPv6
///   `::1`, `fe80::/10`, `fc00::/7`, and IPv4-mapped forms of the above).
pub fn is_public_url(url: &str) -> bool {
    is_public_url_with(url, &SystemResolver)
}

/// [`is_public_url`] with an explicit resolver.
pub fn is_public_url_with(url: &str, resolver: &dyn ResolveHost) -> bool {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(url, error = %e, "rejecting unparseable URL");
            return false;
        }
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        warn!(
            url,
            scheme = parsed.scheme(),
            "URL scheme not allowed (only http/https permitted)"
        );
        return false;
    }

    let addresses = match parsed.host() {
        None => {
            warn!(url, "URL has no hostname");
            return false;
        }
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(Host::Domain(domain)) => match resolver.lookup(domain) {
            Ok(addresses) if !addresses.is_empty() => addresses,
            Ok(_) => {
                warn!(url, host = domain, "hostname resolved to no addresses");
                return false;
            }
            Err(e) => {
                warn!(url, host = domain, error = %e, "unable to resolve hostname");
                return false;
            }
        },
    };

    for address in addresses {
        if is_restricted(address) {
            warn!(url, "URL hostname resolves to a restricted address");
            return false;
        }
    }

    true
}

fn is_restricted(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => is_restricted_v4(v4),
        IpAddr::V6(v6) => is_restricted_v6(v6),
    }
}

fn is_restricted_v4(address: Ipv4Addr) -> bool {
    address.is_private()
        || address.is_loopback()
        || address.is_link_local()
        || address.is_unspecified()
}

fn is_restricted_v6(address: Ipv6Addr) -> bool {
    if let Some(mapped) = address.to_ipv4_mapped() {
        return is_restricted_v4(mapped);
    }

    let first_segment = address.segments()[0];
    address.is_loopback()
        || address.is_unspecified()
        || (first_segment & 0xffc0) == 0xfe80 // link-local fe80::/10
        || (first_segment & 0xfe00) == 0xfc00 // unique local fc00::/7
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Resolver with a fixed host table; unknown hosts fail resolution.
    pub(crate) struct FixedResolver {
        table: HashMap<String, Vec<IpAddr>>,
    }

    impl FixedResolver {
        pub(crate) fn new(entries: &[(&str, &str)]) -> Self {
            let mut table = HashMap::new();
            for (host, ip) in entries {
                table
                    .entry((*host).to_owned())
                    .or_insert_with(Vec::new)
                    .push(ip.parse().expect("test IP"));
            }
            Self { table }
        }
    }

    impl ResolveHost for FixedResolver {
        fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            self.table.get(host).cloned().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no such host: {host}"))
            })
        }
    }

    fn public_resolver() -> FixedResolver {
        FixedResolver::new(&[("example.com", "93.184.216.34")])
    }

    #[test]
    fn test_public_hosts_allowed() {
        let resolver = public_resolver();
        assert!(is_public_url_with("https://example.com/data.csv", &resolver));
        assert!(is_public_url_with("http://example.com/data.csv", &resolver));
        assert!(is_public_url_with("http://1.1.1.1/data.csv", &resolver));
    }

    #[test]
    fn test_non_http_schemes_blocked() {
        let resolver = public_resolver();
        assert!(!is_public_url_with("file:///etc/passwd", &resolver));
        assert!(!is_public_url_with("ftp://example.com/data.csv", &resolver));
    }

    #[test]
    fn test_missing_hostname_blocked() {
        assert!(!is_public_url_with("http:///no-host", &public_resolver()));
    }

    #[test]
    fn test_unresolvable_hostname_blocked() {
        assert!(!is_public_url_with(
            "http://nonexistent-domain-xyz123.test/data",
            &public_resolver()
        ));
    }

    #[test]
    fn test_restricted_v4_addresses_blocked() {
        for ip in [
            "127.0.0.1",
            "127.0.0.2",
            "10.0.0.1",
            "10.255.255.254",
            "192.168.1.1",
            "172.16.0.1",
            "172.31.255.255",
            "169.254.169.254",
            "0.0.0.0",
        ] {
            let resolver = FixedResolver::new(&[("internal.example.com", ip)]);
            assert!(
                !is_public_url_with("http://internal.example.com/api", &resolver),
                "{ip} should be blocked"
            );
            assert!(
                !is_public_url_with(&format!("http://{ip}/api"), &resolver),
                "literal {ip} should be blocked"
            );
        }
    }

    #[test]
    fn test_restricted_v6_addresses_blocked() {
        for ip in ["::1", "fe80::1", "fc00::1", "fd00::1", "fd12:3456:789a::1"] {
            let resolver = FixedResolver::new(&[("internal.example.com", ip)]);
            assert!(
                !is_public_url_with("http://internal.example.com/api", &resolver),
                "{ip} should be blocked"
            );
            assert!(
                !is_public_url_with(&format!("http://[{ip}]/api"), &resolver),
                "literal {ip} should be blocked"
            );
        }
    }

    #[test]
    fn test_ipv4_mapped_v6_blocked() {
        let resolver = FixedResolver::new(&[("sneaky.example.com", "::ffff:10.0.0.1")]);
        assert!(!is_public_url_with("http://sneaky.example.com/api", &resolver));
    }

    #[test]
    fn test_any_restricted_address_poisons_resolution() {
        // Round-robin DNS with one internal address still fails.
        let resolver = FixedResolver::new(&[
            ("dual.example.com", "93.184.216.34"),
            ("dual.example.com", "10.0.0.1"),
        ]);
        assert!(!is_public_url_with("http://dual.example.com/data", &resolver));
    }
}
