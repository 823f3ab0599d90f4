//! Device profiling
//!
//! [`DeviceProfiler`] is the capability the registry consumes. [`NetworkProfiler`]
//! is the best-effort implementation built from reverse DNS, the OUI vendor table,
//! type inference and a TCP connect probe.

pub mod device;
pub mod dns;
pub mod probe;
pub mod profiler;
pub mod vendor;

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use crate::error::EngineResult;
use crate::models::{DeviceProfile, MacAddress};

pub use device::{infer_device_type, DeviceType};
pub use dns::reverse_lookup;
pub use probe::probe_open_ports;
pub use profiler::NetworkProfiler;
pub use vendor::{is_locally_administered, lookup_vendor};

/// Best-effort profile source. Every field of the result is optional; an `Err`
/// means the attempt failed and may be retried later.
pub trait DeviceProfiler: Send + Sync {
    fn profile<'a>(
        &'a self,
        ip: IpAddr,
        mac: &'a MacAddress,
    ) -> Pin<Box<dyn Future<Output = EngineResult<DeviceProfile>> + Send + 'a>>;
}
