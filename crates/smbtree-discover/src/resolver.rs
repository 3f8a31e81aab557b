//! Name to address resolution.
//!
//! The local machine is answered from its own interfaces; every other
//! name goes through the system resolver. IPv4 wins over IPv6.

use std::net::IpAddr;

pub async fn resolve_address(name: &str) -> Option<IpAddr> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Some(ip);
    }
    if is_local_machine(name) {
        return local_interface_address();
    }

    match tokio::net::lookup_host((name, 0)).await {
        Ok(addrs) => prefer_ipv4(addrs.map(|a| a.ip())),
        Err(e) => {
            tracing::debug!(name = %name, error = %e, "Name lookup failed");
            None
        }
    }
}

/// First IPv4 address, falling back to the first IPv6 one.
pub fn prefer_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut ipv6 = None;
    for ip in addrs {
        if ip.is_ipv4() {
            return Some(ip);
        }
        ipv6.get_or_insert(ip);
    }
    ipv6
}

/// Whether `name` is this machine's host name, ignoring case and domain.
pub fn is_local_machine(name: &str) -> bool {
    let Ok(local) = hostname::get() else {
        return false;
    };
    let local = local.to_string_lossy();
    let short = local.split('.').next().unwrap_or(&local);
    let name = name.split('.').next().unwrap_or(name);
    !short.is_empty() && short.eq_ignore_ascii_case(name)
}

/// Address of this machine taken from its interfaces, skipping loopback
/// and multicast.
pub fn local_interface_address() -> Option<IpAddr> {
    prefer_ipv4(
        pnet::datalink::interfaces()
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .flat_map(|iface| iface.ips)
            .map(|net| net.ip())
            .filter(|ip| !ip.is_loopback() && !ip.is_multicast()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_prefer_ipv4() {
        let v4 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(prefer_ipv4([v6, v4]), Some(v4));
        assert_eq!(prefer_ipv4([v6]), Some(v6));
        assert_eq!(prefer_ipv4([]), None);
    }

    #[tokio::test]
    async fn test_literal_addresses_resolve_to_themselves() {
        assert_eq!(
            resolve_address("192.168.1.20").await,
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)))
        );
        assert_eq!(resolve_address("  ").await, None);
    }

    #[test]
    fn test_local_machine_detection() {
        let local = hostname::get().unwrap().to_string_lossy().to_string();
        let short = local.split('.').next().unwrap().to_string();
        if !short.is_empty() {
            assert!(is_local_machine(&short.to_uppercase()));
        }
        assert!(!is_local_machine("definitely-not-this-host-4711"));
    }

    #[test]
    fn test_local_interface_address_skips_loopback() {
        if let Some(ip) = local_interface_address() {
            assert!(!ip.is_loopback());
            assert!(!ip.is_multicast());
        }
    }
}
