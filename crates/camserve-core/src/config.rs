//! Camera configuration.
//!
//! The camera is configured exactly once at startup from an immutable
//! [`CameraConfig`] value. Board wiring is selected through a named
//! [`BoardProfile`] instead of compile-time pin tables, so the same
//! configuration code serves every supported module:
//! - `esp32s3-wroom` (default)
//! - `ai-thinker` (ESP32-CAM)
//! - `wrover-kit`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while building or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A named value (board, format, size) was not recognised.
    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// A field is outside the range the driver accepts.
    #[error("Invalid {field}: {reason}")]
    OutOfRange { field: &'static str, reason: String },
}

fn unknown(kind: &'static str, value: &str) -> ConfigError {
    ConfigError::UnknownValue {
        kind,
        value: value.to_string(),
    }
}

// ============================================================================
// Pixel format / frame size
// ============================================================================

/// Pixel format produced by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    Rgb565,
    Yuv422,
    Grayscale,
    Jpeg,
    Rgb888,
}

impl PixelFormat {
    /// Bytes per pixel for uncompressed formats, `None` for JPEG.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => Some(2),
            PixelFormat::Grayscale => Some(1),
            PixelFormat::Rgb888 => Some(3),
            PixelFormat::Jpeg => None,
        }
    }

    pub fn is_jpeg(self) -> bool {
        self == PixelFormat::Jpeg
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Yuv422 => "yuv422",
            PixelFormat::Grayscale => "grayscale",
            PixelFormat::Jpeg => "jpeg",
            PixelFormat::Rgb888 => "rgb888",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb565" => Ok(PixelFormat::Rgb565),
            "yuv422" => Ok(PixelFormat::Yuv422),
            "grayscale" => Ok(PixelFormat::Grayscale),
            "jpeg" => Ok(PixelFormat::Jpeg),
            "rgb888" => Ok(PixelFormat::Rgb888),
            _ => Err(unknown("pixel format", s)),
        }
    }
}

/// Sensor output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameSize {
    /// 160x120
    Qqvga,
    /// 320x240
    Qvga,
    /// 400x296
    Cif,
    /// 480x320
    Hvga,
    /// 640x480
    Vga,
    /// 800x600
    Svga,
    /// 1024x768
    Xga,
    /// 1280x720
    Hd,
    /// 1280x1024
    Sxga,
    /// 1600x1200
    Uxga,
}

impl FrameSize {
    /// Width and height in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (400, 296),
            FrameSize::Hvga => (480, 320),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Hd => (1280, 720),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
        }
    }
}

impl FromStr for FrameSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qqvga" => Ok(FrameSize::Qqvga),
            "qvga" => Ok(FrameSize::Qvga),
            "cif" => Ok(FrameSize::Cif),
            "hvga" => Ok(FrameSize::Hvga),
            "vga" => Ok(FrameSize::Vga),
            "svga" => Ok(FrameSize::Svga),
            "xga" => Ok(FrameSize::Xga),
            "hd" => Ok(FrameSize::Hd),
            "sxga" => Ok(FrameSize::Sxga),
            "uxga" => Ok(FrameSize::Uxga),
            _ => Err(unknown("frame size", s)),
        }
    }
}

/// Where the driver allocates frame buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FbLocation {
    Psram,
    Dram,
}

/// How the driver fills its frame buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrabMode {
    /// Fill buffers only when they are empty (queued frames).
    WhenEmpty,
    /// Always hand out the most recent frame, dropping stale ones.
    Latest,
}

// ============================================================================
// Board profiles
// ============================================================================

/// GPIO assignment for the camera interface. `-1` means not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMap {
    pub pwdn: i32,
    /// `-1` makes the driver perform a software reset.
    pub reset: i32,
    pub xclk: i32,
    pub sccb_sda: i32,
    pub sccb_scl: i32,
    /// Data lines D0..D7.
    pub data: [i32; 8],
    pub vsync: i32,
    pub href: i32,
    pub pclk: i32,
}

/// Supported camera boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardProfile {
    #[default]
    Esp32s3Wroom,
    AiThinker,
    WroverKit,
}

impl BoardProfile {
    pub const ALL: [BoardProfile; 3] = [
        BoardProfile::Esp32s3Wroom,
        BoardProfile::AiThinker,
        BoardProfile::WroverKit,
    ];

    /// Pin map for this board.
    pub const fn pins(self) -> PinMap {
        match self {
            BoardProfile::Esp32s3Wroom => PinMap {
                pwdn: 38,
                reset: -1,
                xclk: 15,
                sccb_sda: 4,
                sccb_scl: 5,
                data: [11, 9, 8, 10, 12, 18, 17, 16],
                vsync: 6,
                href: 7,
                pclk: 13,
            },
            BoardProfile::AiThinker => PinMap {
                pwdn: 32,
                reset: -1,
                xclk: 0,
                sccb_sda: 26,
                sccb_scl: 27,
                data: [5, 18, 19, 21, 36, 39, 34, 35],
                vsync: 25,
                href: 23,
                pclk: 22,
            },
            BoardProfile::WroverKit => PinMap {
                pwdn: -1,
                reset: -1,
                xclk: 21,
                sccb_sda: 26,
                sccb_scl: 27,
                data: [4, 5, 18, 19, 36, 39, 34, 35],
                vsync: 25,
                href: 23,
                pclk: 22,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoardProfile::Esp32s3Wroom => "esp32s3-wroom",
            BoardProfile::AiThinker => "ai-thinker",
            BoardProfile::WroverKit => "wrover-kit",
        }
    }
}

impl fmt::Display for BoardProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BoardProfile::ALL
            .into_iter()
            .find(|board| board.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| unknown("board", s))
    }
}

// ============================================================================
// Camera configuration
// ============================================================================

/// Full camera driver configuration.
///
/// Built once at startup and passed by reference into the driver's init call.
/// There is no runtime mutation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub board: BoardProfile,
    pub pins: PinMap,

    /// XCLK frequency fed to the sensor.
    pub xclk_freq_hz: u32,
    pub ledc_timer: u8,
    pub ledc_channel: u8,

    pub pixel_format: PixelFormat,
    pub frame_size: FrameSize,

    /// Sensor-side JPEG quality, 0-63 (lower means higher quality).
    pub jpeg_quality: u8,

    /// Number of frame buffers. With JPEG output and more than one buffer the
    /// driver runs in continuous mode.
    pub fb_count: u8,
    pub fb_location: FbLocation,
    pub grab_mode: GrabMode,
}

impl CameraConfig {
    /// Reference configuration for a board: 10 MHz XCLK, RGB565 at QVGA,
    /// a single PSRAM frame buffer that always holds the latest frame.
    pub fn for_board(board: BoardProfile) -> Self {
        Self {
            board,
            pins: board.pins(),
            xclk_freq_hz: 10_000_000,
            ledc_timer: 0,
            ledc_channel: 0,
            pixel_format: PixelFormat::Rgb565,
            frame_size: FrameSize::Qvga,
            jpeg_quality: 12,
            fb_count: 1,
            fb_location: FbLocation::Psram,
            grab_mode: GrabMode::Latest,
        }
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_frame_size(mut self, frame_size: FrameSize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn with_fb_count(mut self, fb_count: u8) -> Self {
        self.fb_count = fb_count;
        self
    }

    /// Check the fields the driver would otherwise reject at init time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jpeg_quality > 63 {
            return Err(ConfigError::OutOfRange {
                field: "jpeg_quality",
                reason: format!("{} is above 63", self.jpeg_quality),
            });
        }
        if self.fb_count == 0 {
            return Err(ConfigError::OutOfRange {
                field: "fb_count",
                reason: "at least one frame buffer is required".to_string(),
            });
        }
        if self.xclk_freq_hz == 0 {
            return Err(ConfigError::OutOfRange {
                field: "xclk_freq_hz",
                reason: "clock must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::for_board(BoardProfile::default())
    }
}
