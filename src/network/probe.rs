//! TCP connect probe for open services

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::models::OpenPort;

/// Concurrent connects per host
const MAX_CONCURRENT_CONNECTS: usize = 8;

/// Try each `(port, service)` pair and return the ones accepting connections, in port order
pub async fn probe_open_ports(
    ip: IpAddr,
    ports: &[(u16, &'static str)],
    timeout: Duration,
) -> Vec<OpenPort> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CONNECTS));
    let mut handles = Vec::with_capacity(ports.len());

    for &(port, service) in ports {
        let semaphore = Arc::clone(&semaphore);

        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    crate::log_warn!("Probe semaphore acquire failed for {}:{}: {}", ip, port, e);
                    return None;
                }
            };

            let addr = SocketAddr::new(ip, port);
            match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
                Ok(Ok(_)) => Some(OpenPort::new(port, service)),
                _ => None,
            }
        }));
    }

    let mut open = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(port)) => open.push(port),
            Ok(None) => {}
            Err(e) => crate::log_warn!("Probe task failed for {}: {}", ip, e),
        }
    }

    open.sort_by_key(|p| p.port);
    open
}
