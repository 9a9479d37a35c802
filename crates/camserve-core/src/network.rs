//! Wireless access-point configuration.
//!
//! The device hosts its own network: clients join the access point and reach
//! the HTTP service at the AP's gateway address.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::config::ConfigError;

/// SSID advertised by the device.
pub const AP_SSID: &str = "ESP32-CAM";

/// WPA passphrase for the access point.
pub const AP_PASSWORD: &str = "12345678";

/// Address clients use to reach the HTTP service.
pub const AP_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Authentication mode offered by the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApAuth {
    Open,
    Wpa2Personal,
    WpaWpa2Personal,
}

/// Access-point settings applied before the radio starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointConfig {
    pub ssid: String,

    /// Passphrase (ignored for open networks).
    pub password: String,

    pub auth: ApAuth,

    /// Maximum number of associated stations.
    pub max_connections: u16,

    pub channel: u8,

    pub gateway: Ipv4Addr,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: AP_SSID.to_string(),
            password: AP_PASSWORD.to_string(),
            auth: ApAuth::WpaWpa2Personal,
            max_connections: 1,
            channel: 1,
            gateway: AP_GATEWAY,
        }
    }
}

impl AccessPointConfig {
    /// Check SSID and passphrase lengths against 802.11 limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return Err(ConfigError::OutOfRange {
                field: "ssid",
                reason: format!("length {} not in 1..=32", self.ssid.len()),
            });
        }
        if self.auth != ApAuth::Open && !(8..=64).contains(&self.password.len()) {
            return Err(ConfigError::OutOfRange {
                field: "password",
                reason: format!("WPA passphrase length {} not in 8..=64", self.password.len()),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_connections",
                reason: "at least one station must be allowed".to_string(),
            });
        }
        Ok(())
    }

    /// URL clients should open once associated.
    pub fn portal_url(&self) -> String {
        format!("http://{}", self.gateway)
    }
}
