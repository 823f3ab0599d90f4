//! MAC address vendor lookup using the OUI database

use mac_oui::Oui;
use std::sync::OnceLock;

use crate::models::MacAddress;

/// OUI database, loaded on first use
static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn get_oui_db() -> Option<&'static Oui> {
    OUI_DB.get_or_init(|| Oui::default().ok()).as_ref()
}

/// Label stored for randomized (locally administered) addresses
pub const RANDOMIZED_VENDOR: &str = "Private Device (Randomized MAC)";

/// Bit 1 of the first octet marks a locally administered (virtual or randomized) address
pub fn is_locally_administered(mac: &MacAddress) -> bool {
    mac.octets()[0] & 0x02 != 0
}

/// Manufacturer for a MAC, if the OUI table knows it
pub fn lookup_vendor(mac: &MacAddress) -> Option<String> {
    if is_locally_administered(mac) {
        return Some(RANDOMIZED_VENDOR.to_string());
    }

    let db = get_oui_db()?;
    match db.lookup_by_mac(&mac.to_string()) {
        Ok(Some(entry)) => Some(entry.company_name.clone()),
        _ => None,
    }
}
