//! Host settings.
//!
//! Read from the JSON file named by `CAMSERVE_CONFIG` when set; every field is
//! optional. `CAMSERVE_BIND` overrides the bind address.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use camserve_core::{BoardProfile, CameraConfig, FrameSize, PixelFormat};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "CAMSERVE_CONFIG";
pub const BIND_ENV: &str = "CAMSERVE_BIND";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind: SocketAddr,
    pub board: BoardProfile,
    pub pixel_format: PixelFormat,
    pub frame_size: FrameSize,
    pub fb_count: u8,
    pub acquire_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let camera = CameraConfig::default();
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            board: camera.board,
            pixel_format: camera.pixel_format,
            frame_size: camera.frame_size,
            fb_count: camera.fb_count,
            acquire_timeout_ms: 4000,
        }
    }
}

impl Settings {
    /// Load from the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let bind = std::env::var(BIND_ENV).ok();
        Self::resolve(config_path.as_deref(), bind.as_deref())
    }

    fn resolve(config_path: Option<&str>, bind: Option<&str>) -> Result<Self> {
        let mut settings = match config_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings file {}", path))?;
                Self::from_json(&json).with_context(|| format!("Invalid settings file {}", path))?
            }
            None => Self::default(),
        };

        if let Some(bind) = bind {
            settings.bind = bind
                .parse()
                .with_context(|| format!("Invalid {}: {}", BIND_ENV, bind))?;
        }
        Ok(settings)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Camera configuration derived from these settings.
    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig::for_board(self.board)
            .with_pixel_format(self.pixel_format)
            .with_frame_size(self.frame_size)
            .with_fb_count(self.fb_count)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}
