//! Simulated camera driver.
//!
//! Models the driver's frame-buffer pool: `fb_count` buffers, each lent out
//! to at most one caller. `acquire` blocks until a buffer is free or the
//! acquire timeout elapses, so with a single buffer concurrent captures are
//! served one after another.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camserve_core::{
    CameraConfig, CameraDriver, ChunkSink, ConfigError, EncodeError, Frame, FrameInfo,
    JpegEncoder, PixelFormat,
};
use log::{debug, warn};
use thiserror::Error;

use crate::encoder::SoftwareJpegEncoder;
use crate::pattern;

/// How long `acquire` waits for a free buffer by default.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(4);

/// Errors raised while bringing up the simulated camera.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid camera configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to render JPEG test frame: {0}")]
    Render(#[from] EncodeError),
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers currently lent out.
    pub outstanding: usize,
    /// Highest `outstanding` ever observed.
    pub peak_outstanding: usize,
    /// Buffers handed out since start.
    pub frames_served: u64,
}

#[derive(Debug, Default)]
struct PoolState {
    stats: PoolStats,
    sensor_fault: bool,
}

#[derive(Debug)]
struct Pool {
    state: Mutex<PoolState>,
    released: Condvar,
    capacity: usize,
}

impl Pool {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut state = self.lock();
        state.stats.outstanding -= 1;
        drop(state);
        self.released.notify_one();
    }
}

/// Camera driver producing colour-bar frames in the configured format.
#[derive(Debug, Clone)]
pub struct SimCamera {
    pool: Arc<Pool>,
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    format: PixelFormat,
    started: Instant,
    acquire_timeout: Duration,
}

impl SimCamera {
    /// Initialize the simulated sensor from `config`.
    pub fn new(config: &CameraConfig) -> Result<Self, SimError> {
        Self::with_acquire_timeout(config, DEFAULT_ACQUIRE_TIMEOUT)
    }

    pub fn with_acquire_timeout(
        config: &CameraConfig,
        acquire_timeout: Duration,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let (width, height) = config.frame_size.dimensions();
        let data = match pattern::color_bars(width, height, config.pixel_format) {
            Some(raw) => raw,
            None => render_jpeg(width, height, config.jpeg_quality)?,
        };
        debug!(
            "Simulated sensor: {} {}x{}, {} buffer(s), {} bytes per frame",
            config.pixel_format,
            width,
            height,
            config.fb_count,
            data.len()
        );

        Ok(Self {
            pool: Arc::new(Pool {
                state: Mutex::new(PoolState::default()),
                released: Condvar::new(),
                capacity: config.fb_count as usize,
            }),
            data: data.into(),
            width,
            height,
            format: config.pixel_format,
            started: Instant::now(),
            acquire_timeout,
        })
    }

    /// Make every following `acquire` fail (or recover with `false`).
    pub fn set_sensor_fault(&self, fault: bool) {
        self.pool.lock().sensor_fault = fault;
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.lock().stats
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Size of one frame buffer's content.
    pub fn frame_len(&self) -> usize {
        self.data.len()
    }
}

impl CameraDriver for SimCamera {
    type Frame = SimFrame;

    fn acquire(&self) -> Option<SimFrame> {
        // A timeout too large to represent waits without a deadline.
        let deadline = Instant::now().checked_add(self.acquire_timeout);
        let mut state = self.pool.lock();

        loop {
            if state.sensor_fault {
                return None;
            }
            if state.stats.outstanding < self.pool.capacity {
                break;
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!("No free frame buffer after {:?}", self.acquire_timeout);
                        return None;
                    }
                    self.pool
                        .released
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .pool
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        state.stats.outstanding += 1;
        state.stats.peak_outstanding = state.stats.peak_outstanding.max(state.stats.outstanding);
        state.stats.frames_served += 1;

        Some(SimFrame {
            data: self.data.clone(),
            info: FrameInfo {
                width: self.width,
                height: self.height,
                format: self.format,
                timestamp: self.started.elapsed(),
            },
            pool: self.pool.clone(),
        })
    }
}

/// A frame buffer lent out by [`SimCamera`]. Returned to the pool on drop.
#[derive(Debug)]
pub struct SimFrame {
    data: Arc<[u8]>,
    info: FrameInfo,
    pool: Arc<Pool>,
}

impl Frame for SimFrame {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn info(&self) -> FrameInfo {
        self.info
    }
}

impl Drop for SimFrame {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// Map sensor quality (0-63, lower is better) onto encoder quality (1-100).
fn sensor_to_encoder_quality(jpeg_quality: u8) -> u8 {
    (100 - (jpeg_quality.min(63) as u32 * 100 / 63)).clamp(10, 95) as u8
}

fn render_jpeg(width: u32, height: u32, jpeg_quality: u8) -> Result<Vec<u8>, EncodeError> {
    struct Bars {
        data: Vec<u8>,
        info: FrameInfo,
    }

    impl Frame for Bars {
        fn data(&self) -> &[u8] {
            &self.data
        }

        fn info(&self) -> FrameInfo {
            self.info
        }
    }

    let bars = Bars {
        data: pattern::color_bars_rgb(width, height),
        info: FrameInfo {
            width,
            height,
            format: PixelFormat::Rgb888,
            timestamp: Duration::ZERO,
        },
    };

    let mut jpeg = Vec::new();
    let mut collect = |_: usize, chunk: &[u8]| {
        jpeg.extend_from_slice(chunk);
        std::ops::ControlFlow::Continue(())
    };
    SoftwareJpegEncoder::new().encode(
        &bars,
        sensor_to_encoder_quality(jpeg_quality),
        &mut collect as &mut dyn ChunkSink,
    )?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camserve_core::FrameSize;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;
    use std::thread;

    fn config(format: PixelFormat) -> CameraConfig {
        CameraConfig::default()
            .with_pixel_format(format)
            .with_frame_size(FrameSize::Qqvga)
    }

    #[test]
    fn test_frames_return_to_pool() {
        let camera = SimCamera::new(&config(PixelFormat::Rgb565)).unwrap();

        let frame = camera.acquire().unwrap();
        assert_eq!(frame.len(), 160 * 120 * 2);
        assert_eq!(frame.info().format, PixelFormat::Rgb565);
        assert_eq!(camera.stats().outstanding, 1);

        drop(frame);
        let stats = camera.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.frames_served, 1);
    }

    #[test]
    fn test_jpeg_mode_serves_encoded_frames() {
        let camera = SimCamera::new(&config(PixelFormat::Jpeg)).unwrap();

        let frame = camera.acquire().unwrap();

        assert_eq!(frame.info().format, PixelFormat::Jpeg);
        assert_eq!(&frame.data()[..2], &[0xFF, 0xD8]);
        assert_eq!(frame.len(), camera.frame_len());
    }

    #[test]
    fn test_sensor_fault_yields_no_frame() {
        let camera = SimCamera::new(&config(PixelFormat::Rgb565)).unwrap();

        camera.set_sensor_fault(true);
        assert!(camera.acquire().is_none());

        camera.set_sensor_fault(false);
        assert!(camera.acquire().is_some());
        assert_eq!(camera.stats().outstanding, 0);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let camera = SimCamera::with_acquire_timeout(
            &config(PixelFormat::Rgb565),
            Duration::from_millis(50),
        )
        .unwrap();

        let held = camera.acquire().unwrap();
        let started = Instant::now();
        assert!(camera.acquire().is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));

        drop(held);
        assert!(camera.acquire().is_some());
    }

    #[test]
    fn test_unbounded_timeout_waits_for_release() {
        let camera =
            SimCamera::with_acquire_timeout(&config(PixelFormat::Rgb565), Duration::MAX).unwrap();

        let held = camera.acquire().unwrap();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(held);
        });

        assert!(camera.acquire().is_some());
        releaser.join().unwrap();
        assert_eq!(camera.stats().outstanding, 0);
        assert_eq!(camera.stats().frames_served, 2);
    }

    #[test]
    fn test_single_buffer_serializes_holders() {
        let camera = SimCamera::new(&config(PixelFormat::Rgb565)).unwrap();
        let first = camera.acquire().unwrap();
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let camera = camera.clone();
            thread::spawn(move || {
                let frame = camera.acquire();
                tx.send(Instant::now()).unwrap();
                frame.is_some()
            })
        };

        // The second caller must still be waiting.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        let released_at = Instant::now();
        drop(first);

        let acquired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(acquired_at >= released_at);
        assert!(waiter.join().unwrap());
        assert_eq!(camera.stats().peak_outstanding, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SimCamera::new(&CameraConfig::default().with_fb_count(0));
        assert!(matches!(result, Err(SimError::Config(_))));
    }
}
