//! ESP32-specific components for camserve.
//!
//! This crate provides the ESP-IDF side of each startup stage:
//! - NVS initialization with one erase-and-retry
//! - Soft access point bring-up
//! - `esp32-camera` driver binding and JPEG conversion
//! - HTTP handler registration on `EspHttpServer`
//!
//! # Architecture
//!
//! The capture logic itself lives in `camserve-core`; this crate only
//! implements its driver, encoder and response traits on top of ESP-IDF.
//! The firmware binary (`camserve-esp32` under `bins/`) sequences the stages.
//!
//! # Example
//!
//! ```ignore
//! use camserve_esp32::{camera::EspCamera, http::start_server, nvs::init_nvs, wifi::start_access_point};
//!
//! let nvs = init_nvs()?;
//! let wifi = start_access_point(&AccessPointConfig::default(), peripherals.modem, sysloop, nvs)?;
//! let camera = EspCamera::init(&CameraConfig::default())?;
//! let server = start_server(camera)?;
//! ```

pub mod camera;
pub mod encoder;
pub mod http;
pub mod nvs;
pub mod wifi;
