//! Reverse DNS lookup for hostname resolution

use dns_lookup::lookup_addr;
use std::net::IpAddr;
use std::time::Duration;

/// Reverse DNS lookup for one address; blocking
pub fn reverse_lookup(ip: IpAddr) -> Option<String> {
    match lookup_addr(&ip) {
        // Resolvers echo the address back when there is no PTR record
        Ok(hostname) if hostname != ip.to_string() => Some(hostname),
        _ => None,
    }
}

/// Reverse lookup on the blocking pool, abandoned after `timeout`
pub async fn resolve_hostname(ip: IpAddr, timeout: Duration) -> Option<String> {
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || reverse_lookup(ip)))
        .await
    {
        Ok(Ok(hostname)) => hostname,
        Ok(Err(e)) => {
            crate::log_warn!("DNS worker join failed for {}: {}", ip, e);
            None
        }
        Err(_) => {
            crate::log_debug!("DNS lookup for {} timed out", ip);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_resolve_hostname_is_bounded() {
        // TEST-NET-1 has no PTR records; must return without hanging
        let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let started = std::time::Instant::now();
        let _ = resolve_hostname(ip, Duration::from_millis(200)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
