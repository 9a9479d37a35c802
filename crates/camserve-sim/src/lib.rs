//! # camserve-sim
//!
//! Host-side stand-ins for the camera hardware:
//! - [`SimCamera`]: a frame-buffer pool serving colour-bar test frames
//! - [`SoftwareJpegEncoder`]: streaming JPEG encoder for raw frames
//!
//! Together they let the capture handler run unchanged on a development
//! machine.

pub mod camera;
pub mod encoder;
pub mod pattern;

pub use camera::{PoolStats, SimCamera, SimError, SimFrame, DEFAULT_ACQUIRE_TIMEOUT};
pub use encoder::{SoftwareJpegEncoder, DEFAULT_CHUNK_SIZE};
