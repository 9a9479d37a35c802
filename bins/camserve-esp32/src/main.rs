//! Camera snapshot firmware for ESP32 boards.
//!
//! This binary requires the ESP32 Rust toolchain.
//! It will not compile with the standard Rust toolchain.
//!
//! Startup is linear and stops at the first failure:
//! NVS -> access point -> camera -> HTTP server, then the main task idles.
//! Select the board wiring with a `board-*` Cargo feature.

use anyhow::anyhow;
use camserve_core::startup::idle_forever;
use camserve_core::{bring_up, AccessPointConfig, BoardProfile, CameraConfig, Platform};
use camserve_esp32::camera::EspCamera;
use camserve_esp32::{http, nvs, wifi};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::http::server::EspHttpServer;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{error, info};

#[cfg(feature = "board-ai-thinker")]
const BOARD: BoardProfile = BoardProfile::AiThinker;

#[cfg(all(feature = "board-wrover-kit", not(feature = "board-ai-thinker")))]
const BOARD: BoardProfile = BoardProfile::WroverKit;

#[cfg(not(any(feature = "board-ai-thinker", feature = "board-wrover-kit")))]
const BOARD: BoardProfile = BoardProfile::Esp32s3Wroom;

/// ESP-IDF services for each startup stage.
struct EspPlatform {
    modem: Option<Modem>,
    sysloop: EspSystemEventLoop,
}

impl Platform for EspPlatform {
    type Storage = EspDefaultNvsPartition;
    type Network = Box<EspWifi<'static>>;
    type Camera = EspCamera;
    type Server = EspHttpServer<'static>;
    type Error = anyhow::Error;

    fn init_storage(&mut self) -> anyhow::Result<EspDefaultNvsPartition> {
        nvs::init_nvs()
    }

    fn start_access_point(
        &mut self,
        storage: &EspDefaultNvsPartition,
        config: &AccessPointConfig,
    ) -> anyhow::Result<Box<EspWifi<'static>>> {
        let modem = self
            .modem
            .take()
            .ok_or_else(|| anyhow!("Wi-Fi modem already in use"))?;
        wifi::start_access_point(config, modem, self.sysloop.clone(), storage.clone())
    }

    fn init_camera(&mut self, config: &CameraConfig) -> anyhow::Result<EspCamera> {
        EspCamera::init(config)
    }

    fn start_server(&mut self, camera: &EspCamera) -> anyhow::Result<EspHttpServer<'static>> {
        http::start_server(*camera)
    }
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("camserve firmware starting on {}", BOARD);

    let peripherals = Peripherals::take()?;
    let mut platform = EspPlatform {
        modem: Some(peripherals.modem),
        sysloop: EspSystemEventLoop::take()?,
    };

    let ap = AccessPointConfig::default();
    let camera = CameraConfig::for_board(BOARD);

    // Keep every handle alive for the lifetime of the firmware.
    let _running = match bring_up(&mut platform, &ap, &camera) {
        Ok(running) => running,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    info!(
        "Camera ready! Connect to SSID: {}, Password: {}",
        ap.ssid, ap.password
    );
    info!("Then visit {} in your web browser", ap.portal_url());

    idle_forever()
}
