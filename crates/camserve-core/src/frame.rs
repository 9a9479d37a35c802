//! Frame buffers, the driver that lends them out, and the streaming encoder.
//!
//! A frame is borrowed from the driver for the duration of one request. The
//! handle returned by [`CameraDriver::acquire`] owns that loan: dropping it
//! hands the buffer back to the driver, so every exit path releases the
//! buffer exactly once.

use std::ops::ControlFlow;
use std::time::Duration;
use thiserror::Error;

use crate::config::PixelFormat;

/// Metadata that travels with a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture time relative to driver start.
    pub timestamp: Duration,
}

impl FrameInfo {
    /// Size in bytes of an uncompressed frame with these dimensions.
    pub fn raw_len(&self) -> Option<usize> {
        self.format
            .bytes_per_pixel()
            .map(|bpp| self.width as usize * self.height as usize * bpp)
    }
}

/// A frame buffer on loan from the driver.
///
/// Implementations return the buffer to the driver in `Drop`.
pub trait Frame {
    /// Captured bytes (`len` bytes starting at the buffer pointer).
    fn data(&self) -> &[u8];

    fn info(&self) -> FrameInfo;

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Source of frame buffers.
pub trait CameraDriver {
    type Frame: Frame;

    /// Take one frame buffer, or `None` when the driver has no frame to give
    /// (sensor fault or acquire timeout).
    fn acquire(&self) -> Option<Self::Frame>;
}

impl<D: CameraDriver + ?Sized> CameraDriver for std::sync::Arc<D> {
    type Frame = D::Frame;

    fn acquire(&self) -> Option<Self::Frame> {
        (**self).acquire()
    }
}

// ============================================================================
// Streaming encode
// ============================================================================

/// Consumer side of a streaming encode.
///
/// The encoder calls [`push`](ChunkSink::push) once per compressed chunk, in
/// order, starting at index 0. Returning `ControlFlow::Break` stops the
/// encode.
pub trait ChunkSink {
    fn push(&mut self, index: usize, chunk: &[u8]) -> ControlFlow<()>;
}

impl<F> ChunkSink for F
where
    F: FnMut(usize, &[u8]) -> ControlFlow<()>,
{
    fn push(&mut self, index: usize, chunk: &[u8]) -> ControlFlow<()> {
        self(index, chunk)
    }
}

/// Errors produced while converting a raw frame to JPEG.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Cannot encode pixel format {0} to JPEG")]
    UnsupportedFormat(PixelFormat),

    #[error("Frame holds {actual} bytes, expected {expected}")]
    ShortFrame { expected: usize, actual: usize },

    /// The chunk consumer returned `Break`.
    #[error("Encoding aborted by chunk consumer")]
    Aborted,

    #[error("JPEG encoder failed: {0}")]
    Encoder(String),
}

/// Converts a non-JPEG frame into a stream of JPEG chunks.
pub trait JpegEncoder<F: Frame + ?Sized> {
    /// Encode `frame` at `quality` (1-100), pushing chunks into `sink`.
    fn encode(&self, frame: &F, quality: u8, sink: &mut dyn ChunkSink) -> Result<(), EncodeError>;
}
