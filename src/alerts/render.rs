//! Alert text rendering

use chrono::{DateTime, Utc};

use crate::database::{AlertRecord, AlertType};
use crate::models::{DeviceRecord, OpenPort};

const UNKNOWN: &str = "Unknown";

fn display_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or(UNKNOWN)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `22 (ssh), 80 (http)`, or `None`
pub fn format_open_ports(ports: &[OpenPort]) -> String {
    if ports.is_empty() {
        return "None".to_string();
    }
    ports
        .iter()
        .map(|p| {
            if p.version.is_empty() {
                format!("{} ({})", p.port, p.service)
            } else {
                format!("{} ({} {})", p.port, p.service, p.version)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Details snapshot for a NewDevice alert
pub fn new_device_details(device: &DeviceRecord) -> String {
    format!(
        "New device detected:\n\
         MAC: {}\n\
         IP: {}\n\
         First Seen: {}\n\
         Hostname: {}\n\
         Vendor: {}\n\
         Type: {}\n\
         Open Ports: {}",
        device.mac,
        or_unknown(device.last_ip.as_deref()),
        display_time(device.first_seen),
        or_unknown(device.hostname.as_deref()),
        or_unknown(device.vendor.as_deref()),
        or_unknown(device.device_type.as_deref()),
        format_open_ports(&device.open_ports),
    )
}

/// Details snapshot for a ThreatActivity alert
pub fn threat_activity_details(device: &DeviceRecord) -> String {
    let level = device
        .threat_level
        .map(|l| capitalize(l.as_str()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut details = format!(
        "Threat device active on the network:\n\
         MAC: {}\n\
         IP: {}\n\
         Threat Level: {}\n\
         Last Seen: {}\n\
         Hostname: {}\n\
         Vendor: {}",
        device.mac,
        or_unknown(device.last_ip.as_deref()),
        level,
        display_time(device.last_seen),
        or_unknown(device.hostname.as_deref()),
        or_unknown(device.vendor.as_deref()),
    );

    if let Some(notes) = device.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        details.push_str("\nNotes: ");
        details.push_str(notes);
    }

    details
}

/// Subject and body handed to every notification channel
pub fn notification(alert: &AlertRecord) -> (String, String) {
    let title = match alert.alert_type {
        AlertType::NewDevice => "New Device Detected",
        AlertType::ThreatActivity => "Threat Device Active",
    };

    let subject = format!("NetGuard Alert: {}", title);
    let body = format!(
        "{}\n\nSeverity: {}\nDetected At: {}\nAlert ID: {}",
        alert.details,
        capitalize(alert.severity.as_str()),
        display_time(alert.detected_at),
        alert.id
    );

    (subject, body)
}
