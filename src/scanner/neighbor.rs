//! Kernel neighbour (ARP) table discovery
//!
//! Reads `/proc/net/arp`, which the kernel fills from ARP traffic on every
//! interface. Only complete entries (flag 0x2) with a real hardware address count.

use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use super::DiscoverySource;
use crate::models::{MacAddress, Observation};

const PROC_NET_ARP: &str = "/proc/net/arp";

/// ATF_COM: entry resolved
const ARP_FLAG_COMPLETE: u32 = 0x2;

#[derive(Debug, Clone)]
pub struct NeighborTableDiscovery {
    path: PathBuf,
}

impl Default for NeighborTableDiscovery {
    fn default() -> Self {
        Self {
            path: PathBuf::from(PROC_NET_ARP),
        }
    }
}

impl NeighborTableDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a neighbour table from another file (tests, containers with a bind mount)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse `/proc/net/arp` content, keeping entries on `interface` (all when empty)
pub fn parse_neighbor_table(content: &str, interface: &str) -> Vec<Observation> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }

            let ip: IpAddr = fields[0].parse().ok()?;
            let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).ok()?;
            let mac = MacAddress::parse(fields[3])?;
            let device = fields[5];

            if flags & ARP_FLAG_COMPLETE == 0 || !mac.is_device_address() {
                return None;
            }
            if !interface.is_empty() && device != interface {
                return None;
            }

            Some(Observation::new(ip, mac.to_string()))
        })
        .collect()
}

impl DiscoverySource for NeighborTableDiscovery {
    fn scan<'a>(
        &'a self,
        target: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Vec<Observation>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.path.clone();
            let read = tokio::time::timeout(timeout, tokio::fs::read_to_string(path)).await;

            match read {
                Ok(Ok(content)) => {
                    let observations = parse_neighbor_table(&content, target);
                    crate::log_debug!(
                        "Neighbour table sweep found {} devices{}",
                        observations.len(),
                        if target.is_empty() {
                            String::new()
                        } else {
                            format!(" on {}", target)
                        }
                    );
                    observations
                }
                Ok(Err(e)) => {
                    crate::log_warn!("Failed to read {}: {}", self.path.display(), e);
                    Vec::new()
                }
                Err(_) => {
                    crate::log_warn!("Neighbour table sweep timed out after {:?}", timeout);
                    Vec::new()
                }
            }
        })
    }
}
