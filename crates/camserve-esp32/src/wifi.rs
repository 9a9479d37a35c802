//! Soft access point for ESP32.
//!
//! The board hosts its own network; clients join it and reach the HTTP
//! server at the gateway address.

use anyhow::{anyhow, Result};
use camserve_core::network::{AccessPointConfig, ApAuth};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::peripheral,
    nvs::EspDefaultNvsPartition,
    wifi::{AccessPointConfiguration, AuthMethod, BlockingWifi, Configuration, EspWifi},
};
use log::info;

/// Map the access point security mode onto the driver's.
pub fn auth_method(auth: ApAuth) -> AuthMethod {
    match auth {
        ApAuth::Open => AuthMethod::None,
        ApAuth::Wpa2Personal => AuthMethod::WPA2Personal,
        ApAuth::WpaWpa2Personal => AuthMethod::WPAWPA2Personal,
    }
}

/// Start the soft access point described by `config`.
///
/// Returns the boxed `EspWifi` driver, which must be kept alive for the
/// access point to stay up.
///
/// # Example
///
/// ```ignore
/// let wifi = start_access_point(&AccessPointConfig::default(), peripherals.modem, sysloop, nvs)?;
/// // Keep `wifi` in scope to keep the network up
/// ```
pub fn start_access_point(
    config: &AccessPointConfig,
    modem: impl peripheral::Peripheral<P = esp_idf_svc::hal::modem::Modem> + 'static,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<Box<EspWifi<'static>>> {
    config.validate()?;

    let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sysloop)?;

    wifi.set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
        ssid: config
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("SSID '{}' too long (max 32 chars)", config.ssid))?,
        password: config
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("Passphrase too long (max 64 chars)"))?,
        auth_method: auth_method(config.auth),
        channel: config.channel,
        max_connections: config.max_connections,
        ..Default::default()
    }))?;

    info!("Starting access point '{}'...", config.ssid);
    wifi.start()?;
    wifi.wait_netif_up()?;

    let ip_info = wifi.wifi().ap_netif().get_ip_info()?;
    info!("Access point up!");
    info!("  SSID:       {}", config.ssid);
    info!("  Channel:    {}", config.channel);
    info!("  IP address: {}", ip_info.ip);
    info!("  Netmask:    {}", ip_info.subnet.mask);

    Ok(Box::new(esp_wifi))
}
