//! Best-effort network profiler

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use super::{device, dns, probe, vendor, DeviceProfiler};
use crate::config::{PROFILE_PROBE_PORTS, PROFILE_PROBE_TIMEOUT};
use crate::error::EngineResult;
use crate::models::{DeviceProfile, MacAddress};

const DNS_TIMEOUT: Duration = Duration::from_secs(2);

/// Combines reverse DNS, OUI vendor lookup, a connect probe and type inference.
/// Lookups that fail just leave their field empty.
#[derive(Debug, Clone)]
pub struct NetworkProfiler {
    ports: Vec<(u16, &'static str)>,
    probe_timeout: Duration,
    dns_timeout: Duration,
}

impl Default for NetworkProfiler {
    fn default() -> Self {
        Self {
            ports: PROFILE_PROBE_PORTS.to_vec(),
            probe_timeout: PROFILE_PROBE_TIMEOUT,
            dns_timeout: DNS_TIMEOUT,
        }
    }
}

impl NetworkProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(mut self, ports: Vec<(u16, &'static str)>) -> Self {
        self.ports = ports;
        self
    }
}

impl DeviceProfiler for NetworkProfiler {
    fn profile<'a>(
        &'a self,
        ip: IpAddr,
        mac: &'a MacAddress,
    ) -> Pin<Box<dyn Future<Output = EngineResult<DeviceProfile>> + Send + 'a>> {
        Box::pin(async move {
            let (hostname, open_ports) = tokio::join!(
                dns::resolve_hostname(ip, self.dns_timeout),
                probe::probe_open_ports(ip, &self.ports, self.probe_timeout),
            );
            let vendor = vendor::lookup_vendor(mac);

            let device_type =
                device::infer_device_type(vendor.as_deref(), hostname.as_deref(), &open_ports);

            crate::log_debug!(
                "Profiled {} ({}): hostname={:?} vendor={:?} type={} ports={}",
                mac,
                ip,
                hostname,
                vendor,
                device_type.as_str(),
                open_ports.len()
            );

            Ok(DeviceProfile {
                hostname,
                vendor,
                device_type: Some(device_type.as_str().to_string()),
                open_ports: Some(open_ports),
            }
            .normalized())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OpenPort;
    use crate::network::vendor::RANDOMIZED_VENDOR;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn profiles_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { while listener.accept().await.is_ok() {} });

        let profiler = NetworkProfiler::new().with_ports(vec![(port, "ipp")]);
        let mac = MacAddress::parse("02:00:00:00:00:01").unwrap();
        let profile = profiler
            .profile(IpAddr::V4(Ipv4Addr::LOCALHOST), &mac)
            .await
            .unwrap();

        assert_eq!(profile.open_ports, Some(vec![OpenPort::new(port, "ipp")]));
        assert_eq!(profile.vendor.as_deref(), Some(RANDOMIZED_VENDOR));
        // Nothing identifies the class, so the placeholder label is dropped
        assert_eq!(profile.device_type, None);
    }
}
