//! Data models for the device lifecycle engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Hardware address in canonical form (lowercase, colon separated).
///
/// Parsing accepts the spellings seen in the wild: `AA-BB-CC-DD-EE-FF`,
/// `aa:bb:cc:dd:ee:ff`, Cisco dotted `aabb.ccdd.eeff`, bare `aabbccddeeff`,
/// unpadded octets (`0:1b:2:…`) and a leading vendor label such as
/// `Cisco-aa-bb-cc-dd-ee-ff` or `HP aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// All-zero and broadcast addresses never identify a device
    pub fn is_device_address(&self) -> bool {
        self.0 != [0; 6] && self.0 != [0xff; 6]
    }

    /// Canonicalize any supported textual form
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let is_mac_char = |c: char| c.is_ascii_hexdigit() || matches!(c, ':' | '-' | '.');

        // Keep only the trailing run of address characters; a vendor label ends
        // at the first non-address character.
        let start = raw
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_mac_char(*c))
            .last()
            .map(|(i, _)| i)?;
        let groups: Vec<&str> = raw[start..]
            .split([':', '-', '.'])
            .filter(|g| !g.is_empty())
            .collect();

        let hex: String = if groups.len() >= 6
            && groups[groups.len() - 6..]
                .iter()
                .all(|g| (1..=2).contains(&g.len()))
        {
            groups[groups.len() - 6..]
                .iter()
                .map(|g| format!("{:0>2}", g))
                .collect()
        } else if groups.len() >= 3 && groups[groups.len() - 3..].iter().all(|g| g.len() == 4) {
            groups[groups.len() - 3..].concat()
        } else if groups.last().is_some_and(|g| g.len() == 12) {
            groups.last()?.to_string()
        } else {
            return None;
        };

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }
        Some(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MacAddress::parse(s).ok_or_else(|| format!("Invalid MAC address: {}", s))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The three disjoint device sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Known,
    PendingReview,
    Threat,
}

impl DeviceState {
    pub const ALL: [DeviceState; 3] = [
        DeviceState::Known,
        DeviceState::PendingReview,
        DeviceState::Threat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Known => "known",
            DeviceState::PendingReview => "pending",
            DeviceState::Threat => "threat",
        }
    }

    /// Backing table for this set
    pub(crate) fn table(&self) -> &'static str {
        match self {
            DeviceState::Known => "known_devices",
            DeviceState::PendingReview => "pending_devices",
            DeviceState::Threat => "threat_devices",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "known" => Ok(DeviceState::Known),
            "pending" | "pending_review" | "new" => Ok(DeviceState::PendingReview),
            "threat" | "unknown" => Ok(DeviceState::Threat),
            other => Err(format!("Unknown device state: {}", other)),
        }
    }
}

/// Operator-assigned distrust level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ThreatLevel::Low),
            "medium" => Ok(ThreatLevel::Medium),
            "high" => Ok(ThreatLevel::High),
            other => Err(format!("Unknown threat level: {}", other)),
        }
    }
}

/// One open service found by the profiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub port: u16,
    pub service: String,
    #[serde(default)]
    pub version: String,
}

impl OpenPort {
    pub fn new(port: u16, service: impl Into<String>) -> Self {
        Self {
            port,
            service: service.into(),
            version: String::new(),
        }
    }
}

/// Best-effort profiler output; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub device_type: Option<String>,
    pub open_ports: Option<Vec<OpenPort>>,
}

impl DeviceProfile {
    pub fn is_empty(&self) -> bool {
        self.hostname.is_none()
            && self.vendor.is_none()
            && self.device_type.is_none()
            && self.open_ports.is_none()
    }

    /// Drop blank and placeholder values so they never overwrite stored data
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown"))
        }

        Self {
            hostname: keep(self.hostname),
            vendor: keep(self.vendor),
            device_type: keep(self.device_type),
            open_ports: self.open_ports,
        }
    }
}

/// One (IP, MAC) pair reported by a discovery sweep, MAC not yet canonical
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    pub ip: IpAddr,
    pub mac: String,
}

impl Observation {
    pub fn new(ip: IpAddr, mac: impl Into<String>) -> Self {
        Self {
            ip,
            mac: mac.into(),
        }
    }
}

/// Device record as stored in one of the three sets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub mac: MacAddress,
    pub state: DeviceState,
    pub last_ip: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_ports: Vec<OpenPort>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_level: Option<ThreatLevel>,
    /// Set once a profiling attempt has completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiled_at: Option<DateTime<Utc>>,
    /// Display flag for known devices; cleared when stale
    pub is_active: bool,
}

impl DeviceRecord {
    pub fn is_profiled(&self) -> bool {
        self.profiled_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(raw: &str) -> String {
        MacAddress::parse(raw)
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("<invalid {}>", raw))
    }

    #[test]
    fn canonicalizes_common_spellings() {
        assert_eq!(mac("AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac("aa:bb:cc:dd:ee:ff"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac("Aa:Bb:Cc:Dd:Ee:Ff"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac("aabb.ccdd.eeff"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac("AABBCCDDEEFF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac("  0:1b:2:3c:4:5  "), "00:1b:02:3c:04:05");
    }

    #[test]
    fn strips_vendor_labels() {
        assert_eq!(mac("Cisco-AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac("HP aa:bb:cc:dd:ee:ff"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac("Apple_11:22:33:44:55:66"), "11:22:33:44:55:66");
        // Label made only of hex letters still leaves six trailing octets
        assert_eq!(mac("Acebed-11-22-33-44-55-66"), "11:22:33:44:55:66");
    }

    #[test]
    fn rejects_garbage() {
        assert!(MacAddress::parse("").is_none());
        assert!(MacAddress::parse("not a mac").is_none());
        assert!(MacAddress::parse("aa:bb:cc").is_none());
        assert!(MacAddress::parse("gg:hh:ii:jj:kk:ll").is_none());
    }

    #[test]
    fn broadcast_is_not_a_device() {
        assert!(!MacAddress::new([0xff; 6]).is_device_address());
        assert!(!MacAddress::new([0; 6]).is_device_address());
        assert!(MacAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]).is_device_address());
    }

    #[test]
    fn profile_normalization_drops_placeholders() {
        let profile = DeviceProfile {
            hostname: Some("Unknown".to_string()),
            vendor: Some("  ".to_string()),
            device_type: Some("Printer".to_string()),
            open_ports: None,
        }
        .normalized();
        assert_eq!(profile.hostname, None);
        assert_eq!(profile.vendor, None);
        assert_eq!(profile.device_type.as_deref(), Some("Printer"));
    }

    #[test]
    fn mac_serializes_as_canonical_string() {
        let parsed: MacAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, "\"aa:bb:cc:dd:ee:ff\"");
    }
}
