//! `esp32-camera` driver binding.
//!
//! [`EspCamera`] initializes the driver from a [`CameraConfig`] and lends out
//! frame buffers as [`EspFrame`] handles. Dropping a handle calls
//! `esp_camera_fb_return`, so a buffer goes back to the driver exactly once
//! however the request ends.

use std::ptr::{self, NonNull};
use std::time::Duration;

use anyhow::{bail, Result};
use camserve_core::{
    CameraConfig, CameraDriver, FbLocation, Frame, FrameInfo, FrameSize, GrabMode, PixelFormat,
};
use esp_idf_svc::sys::camera::{
    camera_config_t, camera_fb_location_t, camera_fb_location_t_CAMERA_FB_IN_DRAM,
    camera_fb_location_t_CAMERA_FB_IN_PSRAM, camera_fb_t, camera_grab_mode_t,
    camera_grab_mode_t_CAMERA_GRAB_LATEST, camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,
    esp_camera_fb_get, esp_camera_fb_return, esp_camera_init, framesize_t,
    framesize_t_FRAMESIZE_CIF, framesize_t_FRAMESIZE_HD, framesize_t_FRAMESIZE_HVGA,
    framesize_t_FRAMESIZE_QQVGA, framesize_t_FRAMESIZE_QVGA, framesize_t_FRAMESIZE_SVGA,
    framesize_t_FRAMESIZE_SXGA, framesize_t_FRAMESIZE_UXGA, framesize_t_FRAMESIZE_VGA,
    framesize_t_FRAMESIZE_XGA, ledc_channel_t, ledc_timer_t, pixformat_t,
    pixformat_t_PIXFORMAT_GRAYSCALE, pixformat_t_PIXFORMAT_JPEG, pixformat_t_PIXFORMAT_RGB565,
    pixformat_t_PIXFORMAT_RGB888, pixformat_t_PIXFORMAT_YUV422,
};
use esp_idf_svc::sys::ESP_OK;
use log::{error, info};

pub fn pixformat(format: PixelFormat) -> pixformat_t {
    match format {
        PixelFormat::Rgb565 => pixformat_t_PIXFORMAT_RGB565,
        PixelFormat::Yuv422 => pixformat_t_PIXFORMAT_YUV422,
        PixelFormat::Grayscale => pixformat_t_PIXFORMAT_GRAYSCALE,
        PixelFormat::Jpeg => pixformat_t_PIXFORMAT_JPEG,
        PixelFormat::Rgb888 => pixformat_t_PIXFORMAT_RGB888,
    }
}

#[allow(non_upper_case_globals)]
fn pixel_format_from_raw(raw: pixformat_t) -> Option<PixelFormat> {
    match raw {
        pixformat_t_PIXFORMAT_RGB565 => Some(PixelFormat::Rgb565),
        pixformat_t_PIXFORMAT_YUV422 => Some(PixelFormat::Yuv422),
        pixformat_t_PIXFORMAT_GRAYSCALE => Some(PixelFormat::Grayscale),
        pixformat_t_PIXFORMAT_JPEG => Some(PixelFormat::Jpeg),
        pixformat_t_PIXFORMAT_RGB888 => Some(PixelFormat::Rgb888),
        _ => None,
    }
}

pub fn framesize(size: FrameSize) -> framesize_t {
    match size {
        FrameSize::Qqvga => framesize_t_FRAMESIZE_QQVGA,
        FrameSize::Qvga => framesize_t_FRAMESIZE_QVGA,
        FrameSize::Cif => framesize_t_FRAMESIZE_CIF,
        FrameSize::Hvga => framesize_t_FRAMESIZE_HVGA,
        FrameSize::Vga => framesize_t_FRAMESIZE_VGA,
        FrameSize::Svga => framesize_t_FRAMESIZE_SVGA,
        FrameSize::Xga => framesize_t_FRAMESIZE_XGA,
        FrameSize::Hd => framesize_t_FRAMESIZE_HD,
        FrameSize::Sxga => framesize_t_FRAMESIZE_SXGA,
        FrameSize::Uxga => framesize_t_FRAMESIZE_UXGA,
    }
}

fn fb_location(location: FbLocation) -> camera_fb_location_t {
    match location {
        FbLocation::Psram => camera_fb_location_t_CAMERA_FB_IN_PSRAM,
        FbLocation::Dram => camera_fb_location_t_CAMERA_FB_IN_DRAM,
    }
}

fn grab_mode(mode: GrabMode) -> camera_grab_mode_t {
    match mode {
        GrabMode::WhenEmpty => camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,
        GrabMode::Latest => camera_grab_mode_t_CAMERA_GRAB_LATEST,
    }
}

/// Translate a [`CameraConfig`] into the driver's config struct.
pub fn driver_config(config: &CameraConfig) -> camera_config_t {
    let pins = &config.pins;
    let mut raw = camera_config_t::default();

    raw.pin_pwdn = pins.pwdn;
    raw.pin_reset = pins.reset;
    raw.pin_xclk = pins.xclk;
    raw.pin_d0 = pins.data[0];
    raw.pin_d1 = pins.data[1];
    raw.pin_d2 = pins.data[2];
    raw.pin_d3 = pins.data[3];
    raw.pin_d4 = pins.data[4];
    raw.pin_d5 = pins.data[5];
    raw.pin_d6 = pins.data[6];
    raw.pin_d7 = pins.data[7];
    raw.pin_vsync = pins.vsync;
    raw.pin_href = pins.href;
    raw.pin_pclk = pins.pclk;

    // SCCB pins live in bindgen-generated unions.
    raw.__bindgen_anon_1.pin_sccb_sda = pins.sccb_sda;
    raw.__bindgen_anon_2.pin_sccb_scl = pins.sccb_scl;

    raw.xclk_freq_hz = config.xclk_freq_hz as i32;
    raw.ledc_timer = config.ledc_timer as ledc_timer_t;
    raw.ledc_channel = config.ledc_channel as ledc_channel_t;

    raw.pixel_format = pixformat(config.pixel_format);
    raw.frame_size = framesize(config.frame_size);
    raw.jpeg_quality = config.jpeg_quality as i32;
    raw.fb_count = config.fb_count as usize;
    raw.fb_location = fb_location(config.fb_location);
    raw.grab_mode = grab_mode(config.grab_mode);

    raw
}

/// The initialized camera driver.
///
/// The driver is a process-wide singleton; only one `EspCamera` should exist.
#[derive(Debug, Clone, Copy)]
pub struct EspCamera {
    format: PixelFormat,
}

impl EspCamera {
    /// Initialize the driver. Fails if the sensor is not detected or the
    /// configuration is rejected.
    pub fn init(config: &CameraConfig) -> Result<Self> {
        config.validate()?;

        let raw = driver_config(config);
        let err = unsafe { esp_camera_init(&raw) };
        if err != ESP_OK {
            error!("Camera Init Failed");
            bail!("esp_camera_init returned {}", err);
        }

        info!("Camera initialized on board {}", config.board);
        Ok(Self {
            format: config.pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }
}

impl CameraDriver for EspCamera {
    type Frame = EspFrame;

    fn acquire(&self) -> Option<EspFrame> {
        let fb = unsafe { esp_camera_fb_get() };
        NonNull::new(fb).map(|fb| EspFrame {
            fb,
            fallback_format: self.format,
        })
    }
}

/// A frame buffer on loan from the driver.
pub struct EspFrame {
    fb: NonNull<camera_fb_t>,
    fallback_format: PixelFormat,
}

// The driver hands buffers to whichever task asks; the pointer is only read
// while the handle is alive.
unsafe impl Send for EspFrame {}

impl EspFrame {
    /// Raw buffer pointer for driver calls such as `frame2jpg_cb`.
    pub fn as_ptr(&self) -> *mut camera_fb_t {
        self.fb.as_ptr()
    }
}

impl Frame for EspFrame {
    fn data(&self) -> &[u8] {
        // camera_fb_t is not guaranteed to be aligned for Rust reads.
        unsafe {
            let fb = self.fb.as_ptr();
            let buf = ptr::addr_of!((*fb).buf).read_unaligned();
            let len = ptr::addr_of!((*fb).len).read_unaligned();
            if buf.is_null() {
                &[]
            } else {
                std::slice::from_raw_parts(buf, len)
            }
        }
    }

    fn info(&self) -> FrameInfo {
        unsafe {
            let fb = self.fb.as_ptr();
            let width = ptr::addr_of!((*fb).width).read_unaligned();
            let height = ptr::addr_of!((*fb).height).read_unaligned();
            let format = ptr::addr_of!((*fb).format).read_unaligned();
            let timestamp = ptr::addr_of!((*fb).timestamp).read_unaligned();

            FrameInfo {
                width: width as u32,
                height: height as u32,
                format: pixel_format_from_raw(format).unwrap_or(self.fallback_format),
                timestamp: Duration::new(timestamp.tv_sec as u64, 0)
                    + Duration::from_micros(timestamp.tv_usec as u64),
            }
        }
    }
}

impl Drop for EspFrame {
    fn drop(&mut self) {
        unsafe { esp_camera_fb_return(self.fb.as_ptr()) };
    }
}
