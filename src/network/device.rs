//! Device type inference from vendor names, hostnames and open ports

use serde::Serialize;

use crate::models::OpenPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    AccessPoint,
    Firewall,
    Server,
    Nas,
    Pc,
    Laptop,
    Mobile,
    SmartTv,
    IotDevice,
    Printer,
    Camera,
    GameConsole,
    Unknown,
}

impl DeviceType {
    /// Label stored on the device record
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Router => "router",
            DeviceType::AccessPoint => "access point",
            DeviceType::Firewall => "firewall",
            DeviceType::Server => "server",
            DeviceType::Nas => "nas",
            DeviceType::Pc => "pc",
            DeviceType::Laptop => "laptop",
            DeviceType::Mobile => "mobile",
            DeviceType::SmartTv => "smart tv",
            DeviceType::IotDevice => "iot device",
            DeviceType::Printer => "printer",
            DeviceType::Camera => "camera",
            DeviceType::GameConsole => "game console",
            DeviceType::Unknown => "unknown",
        }
    }
}

type Rule = (DeviceType, &'static [&'static str]);

/// First matching rule wins; specific makers come before broad ones
const VENDOR_RULES: &[Rule] = &[
    (DeviceType::Printer, &["canon", "epson", "brother", "xerox", "ricoh", "lexmark", "kyocera"]),
    (DeviceType::Nas, &["synology", "qnap", "western digital", "buffalo"]),
    (DeviceType::Camera, &["hikvision", "dahua", "axis communications", "reolink", "arlo"]),
    (DeviceType::Firewall, &["fortinet", "palo alto", "sonicwall", "watchguard"]),
    (DeviceType::AccessPoint, &["aruba", "ruckus", "meraki", "ubiquiti"]),
    (
        DeviceType::Router,
        &["cisco", "juniper", "mikrotik", "netgear", "tp-link", "d-link", "linksys", "avm"],
    ),
    (DeviceType::GameConsole, &["nintendo", "sony interactive"]),
    (DeviceType::SmartTv, &["roku", "lg electronics", "hisense", "tcl", "vizio"]),
    (DeviceType::IotDevice, &["espressif", "tuya", "shelly", "sonoff", "signify", "raspberry pi"]),
    (DeviceType::Mobile, &["apple", "samsung", "xiaomi", "huawei", "oneplus", "oppo"]),
    (DeviceType::Server, &["supermicro", "vmware", "proxmox"]),
    (DeviceType::Pc, &["dell", "lenovo", "hewlett", "acer", "asustek", "micro-star", "intel"]),
];

const HOSTNAME_RULES: &[Rule] = &[
    (DeviceType::Printer, &["printer", "prn-", "mfp", "laserjet", "officejet"]),
    (DeviceType::Nas, &["nas", "diskstation", "synology", "qnap"]),
    (DeviceType::Camera, &["camera", "cam-", "ipcam", "nvr", "doorbell"]),
    (DeviceType::GameConsole, &["xbox", "playstation", "ps5", "nintendo"]),
    (DeviceType::SmartTv, &["tv-", "-tv", "smarttv", "chromecast", "appletv", "firetv", "roku"]),
    (DeviceType::Mobile, &["iphone", "ipad", "android", "galaxy", "pixel"]),
    (DeviceType::Laptop, &["laptop", "macbook", "thinkpad", "notebook"]),
    (DeviceType::Pc, &["desktop", "workstation", "-pc", "pc-"]),
    (DeviceType::Router, &["router", "gateway", "fritz", "openwrt"]),
    (DeviceType::AccessPoint, &["ap-", "accesspoint", "unifi"]),
    (DeviceType::Server, &["server", "srv", "proxmox", "esxi"]),
];

/// A port that on its own identifies the device class
const PORT_RULES: &[(u16, DeviceType)] = &[
    (9100, DeviceType::Printer),
    (631, DeviceType::Printer),
    (515, DeviceType::Printer),
    (554, DeviceType::Camera),
    (5000, DeviceType::Nas),
    (5001, DeviceType::Nas),
    (3389, DeviceType::Pc),
];

fn match_rules(text: &str, rules: &[Rule]) -> Option<DeviceType> {
    let text = text.to_lowercase();
    rules
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| text.contains(n)))
        .map(|(device_type, _)| *device_type)
}

pub fn infer_from_vendor(vendor: &str) -> Option<DeviceType> {
    match_rules(vendor, VENDOR_RULES)
}

pub fn infer_from_hostname(hostname: &str) -> Option<DeviceType> {
    match_rules(hostname, HOSTNAME_RULES)
}

pub fn infer_from_ports(ports: &[OpenPort]) -> Option<DeviceType> {
    let has = |port: u16| ports.iter().any(|p| p.port == port);

    if let Some((_, device_type)) = PORT_RULES.iter().find(|(port, _)| has(*port)) {
        return Some(*device_type);
    }
    if has(22) && (has(80) || has(443)) {
        return Some(DeviceType::Server);
    }
    None
}

/// Hostname first (operators name their devices), then vendor, then ports
pub fn infer_device_type(
    vendor: Option<&str>,
    hostname: Option<&str>,
    ports: &[OpenPort],
) -> DeviceType {
    hostname
        .and_then(infer_from_hostname)
        .or_else(|| vendor.and_then(infer_from_vendor))
        .or_else(|| infer_from_ports(ports))
        .unwrap_or(DeviceType::Unknown)
}
