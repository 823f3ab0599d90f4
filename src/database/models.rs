//! Alert and discovery-log records as stored

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ThreatLevel;

/// Alert types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NewDevice,
    ThreatActivity,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::NewDevice => "new_device",
            AlertType::ThreatActivity => "threat_activity",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_device" => Ok(AlertType::NewDevice),
            "threat_activity" => Ok(AlertType::ThreatActivity),
            _ => Err(format!("Unknown alert type: {}", s)),
        }
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

impl From<ThreatLevel> for AlertSeverity {
    fn from(level: ThreatLevel) -> Self {
        match level {
            ThreatLevel::Low => AlertSeverity::Low,
            ThreatLevel::Medium => AlertSeverity::Medium,
            ThreatLevel::High => AlertSeverity::High,
        }
    }
}

/// Alert record from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub device_mac: String,
    pub alert_type: AlertType,
    pub detected_at: DateTime<Utc>,
    pub details: String,
    pub severity: AlertSeverity,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

/// Parameters used to create an alert
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub device_mac: String,
    pub alert_type: AlertType,
    pub details: String,
    pub severity: AlertSeverity,
}

/// One sighting from the discovery log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    pub mac: String,
    pub ip: String,
    pub seen_at: DateTime<Utc>,
    pub state: String,
}
