//! Snapshot capture handler.
//!
//! Framework-agnostic: the HTTP layer supplies a [`CaptureResponder`] for the
//! request being served, the platform supplies a [`CameraDriver`] and a
//! [`JpegEncoder`]. Per request the handler:
//! 1. Acquires one frame buffer (500 with an empty body when there is none)
//! 2. Sends JPEG frames as-is in a single write with `Content-Length`
//! 3. Stream-encodes every other format to JPEG as a chunked body
//! 4. Releases the frame before returning, on every path

use std::fmt;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use thiserror::Error;

use crate::frame::{CameraDriver, ChunkSink, EncodeError, Frame, JpegEncoder};
use crate::routes::CONTENT_TYPE_JPEG;

/// Quality used when converting raw frames to JPEG.
pub const ENCODE_QUALITY: u8 = 80;

/// Suggested filename for browsers saving the snapshot.
pub const CAPTURE_DISPOSITION: &str = "inline; filename=capture.jpg";

// ============================================================================
// Response abstraction
// ============================================================================

/// Headers to send on a transport that frames every body as chunked.
///
/// Drops `Content-Length`, which must not accompany
/// `Transfer-Encoding: chunked`.
pub fn chunked_headers<'h>(headers: &[(&'h str, &'h str)]) -> Vec<(&'h str, &'h str)> {
    headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("content-length"))
        .copied()
        .collect()
}

/// Body of an open HTTP response.
pub trait ResponseBody {
    type Error: fmt::Display;

    /// Send one chunk of the body.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error>;

    /// Complete the body. For chunked bodies this sends the zero-length
    /// terminating chunk.
    fn finish(self) -> Result<(), Self::Error>;
}

/// Response side of one capture request, consumed by whichever branch runs.
pub trait CaptureResponder {
    type Error: fmt::Display;
    type Body: ResponseBody<Error = Self::Error>;

    /// Send a bodiless error status.
    fn reject(self, status: u16) -> Result<(), Self::Error>;

    /// Send `200 OK` with `headers` and open the body. Without a
    /// `Content-Length` header the body is chunked.
    fn open(self, headers: &[(&str, &str)]) -> Result<Self::Body, Self::Error>;
}

// ============================================================================
// Outcome / errors
// ============================================================================

/// Which branch served the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBranch {
    /// Frame was already JPEG and sent unchanged.
    Passthrough,
    /// Frame was encoded to JPEG on the fly.
    Encoded,
}

/// Result of a successful capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub branch: CaptureBranch,
    pub bytes_sent: usize,
    pub chunks: usize,
    pub elapsed: Duration,
}

/// Errors from a single capture request.
#[derive(Debug, Error)]
pub enum CaptureError<E> {
    /// The driver had no frame buffer to give.
    #[error("Camera capture failed")]
    NoFrame,

    /// Writing the response failed.
    #[error("Failed to send response: {0}")]
    Response(E),

    /// The encoder failed after `bytes_sent` bytes had gone out.
    #[error("JPEG compression failed after {bytes_sent} bytes: {source}")]
    Encode {
        source: EncodeError,
        bytes_sent: usize,
    },
}

// ============================================================================
// Chunking context
// ============================================================================

/// Forwards encoder chunks to an open response body and counts what was
/// sent. Stops the encoder on the first failed write.
pub struct ChunkingContext<'a, B: ResponseBody> {
    body: &'a mut B,
    len: usize,
    chunks: usize,
    error: Option<B::Error>,
}

impl<'a, B: ResponseBody> ChunkingContext<'a, B> {
    pub fn new(body: &'a mut B) -> Self {
        Self {
            body,
            len: 0,
            chunks: 0,
            error: None,
        }
    }

    /// Bytes forwarded so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes sent, chunks sent, and the write error that stopped the stream.
    pub fn into_parts(self) -> (usize, usize, Option<B::Error>) {
        (self.len, self.chunks, self.error)
    }
}

impl<B: ResponseBody> ChunkSink for ChunkingContext<'_, B> {
    fn push(&mut self, index: usize, chunk: &[u8]) -> ControlFlow<()> {
        if index == 0 {
            self.len = 0;
            self.chunks = 0;
        }
        match self.body.write_chunk(chunk) {
            Ok(()) => {
                self.len += chunk.len();
                self.chunks += 1;
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.error = Some(e);
                ControlFlow::Break(())
            }
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Serve one snapshot request.
pub fn handle_capture<D, E, R>(
    driver: &D,
    encoder: &E,
    responder: R,
) -> Result<CaptureOutcome, CaptureError<R::Error>>
where
    D: CameraDriver,
    E: JpegEncoder<D::Frame>,
    R: CaptureResponder,
{
    let started = Instant::now();

    let Some(frame) = driver.acquire() else {
        error!("Camera capture failed");
        responder.reject(500).map_err(CaptureError::Response)?;
        return Err(CaptureError::NoFrame);
    };

    let result = if frame.info().format.is_jpeg() {
        send_jpeg(&frame, responder)
    } else {
        send_encoded(&frame, encoder, responder)
    };

    // Hand the buffer back before anything else happens on this request.
    drop(frame);

    let elapsed = started.elapsed();
    match &result {
        Ok(outcome) => info!(
            "JPG: {}KB {}ms",
            outcome.bytes_sent / 1024,
            elapsed.as_millis()
        ),
        Err(e) => warn!("Capture aborted after {}ms: {}", elapsed.as_millis(), e),
    }

    result.map(|outcome| CaptureOutcome { elapsed, ..outcome })
}

fn send_jpeg<F, R>(frame: &F, responder: R) -> Result<CaptureOutcome, CaptureError<R::Error>>
where
    F: Frame,
    R: CaptureResponder,
{
    let data = frame.data();
    let content_length = data.len().to_string();
    let headers = [
        ("Content-Type", CONTENT_TYPE_JPEG),
        ("Content-Disposition", CAPTURE_DISPOSITION),
        ("Content-Length", content_length.as_str()),
    ];

    let mut body = responder.open(&headers).map_err(CaptureError::Response)?;
    body.write_chunk(data).map_err(CaptureError::Response)?;
    body.finish().map_err(CaptureError::Response)?;

    Ok(CaptureOutcome {
        branch: CaptureBranch::Passthrough,
        bytes_sent: data.len(),
        chunks: 1,
        elapsed: Duration::ZERO,
    })
}

fn send_encoded<F, E, R>(
    frame: &F,
    encoder: &E,
    responder: R,
) -> Result<CaptureOutcome, CaptureError<R::Error>>
where
    F: Frame,
    E: JpegEncoder<F>,
    R: CaptureResponder,
{
    let headers = [
        ("Content-Type", CONTENT_TYPE_JPEG),
        ("Content-Disposition", CAPTURE_DISPOSITION),
    ];
    let mut body = responder.open(&headers).map_err(CaptureError::Response)?;

    let mut context = ChunkingContext::new(&mut body);
    let encoded = encoder.encode(frame, ENCODE_QUALITY, &mut context);
    let (bytes_sent, chunks, write_error) = context.into_parts();

    // The terminating chunk goes out even when the stream was cut short.
    let finished = body.finish();

    if let Some(e) = write_error {
        return Err(CaptureError::Response(e));
    }
    encoded.map_err(|source| CaptureError::Encode { source, bytes_sent })?;
    finished.map_err(CaptureError::Response)?;

    Ok(CaptureOutcome {
        branch: CaptureBranch::Encoded,
        bytes_sent,
        chunks,
        elapsed: Duration::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PixelFormat;
    use crate::frame::FrameInfo;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    // ------------------------------------------------------------------------
    // Fake driver
    // ------------------------------------------------------------------------

    struct FakeFrame {
        data: Vec<u8>,
        format: PixelFormat,
        outstanding: Rc<Cell<usize>>,
    }

    impl Frame for FakeFrame {
        fn data(&self) -> &[u8] {
            &self.data
        }

        fn info(&self) -> FrameInfo {
            FrameInfo {
                width: 4,
                height: 2,
                format: self.format,
                timestamp: Duration::ZERO,
            }
        }
    }

    impl Drop for FakeFrame {
        fn drop(&mut self) {
            self.outstanding.set(self.outstanding.get() - 1);
        }
    }

    struct FakeDriver {
        frame: Option<(PixelFormat, Vec<u8>)>,
        outstanding: Rc<Cell<usize>>,
    }

    impl FakeDriver {
        fn with_frame(format: PixelFormat, data: Vec<u8>) -> Self {
            Self {
                frame: Some((format, data)),
                outstanding: Rc::new(Cell::new(0)),
            }
        }

        fn empty() -> Self {
            Self {
                frame: None,
                outstanding: Rc::new(Cell::new(0)),
            }
        }
    }

    impl CameraDriver for FakeDriver {
        type Frame = FakeFrame;

        fn acquire(&self) -> Option<FakeFrame> {
            let (format, data) = self.frame.clone()?;
            self.outstanding.set(self.outstanding.get() + 1);
            Some(FakeFrame {
                data,
                format,
                outstanding: self.outstanding.clone(),
            })
        }
    }

    // ------------------------------------------------------------------------
    // Scripted encoder
    // ------------------------------------------------------------------------

    struct ScriptedEncoder {
        chunks: Vec<Vec<u8>>,
        fail_after: Option<usize>,
        seen_outstanding: Cell<Option<usize>>,
        outstanding: Rc<Cell<usize>>,
    }

    impl ScriptedEncoder {
        fn new(driver: &FakeDriver, sizes: &[usize]) -> Self {
            Self {
                chunks: sizes.iter().map(|&n| vec![0xAB; n]).collect(),
                fail_after: None,
                seen_outstanding: Cell::new(None),
                outstanding: driver.outstanding.clone(),
            }
        }
    }

    impl JpegEncoder<FakeFrame> for ScriptedEncoder {
        fn encode(
            &self,
            _frame: &FakeFrame,
            _quality: u8,
            sink: &mut dyn ChunkSink,
        ) -> Result<(), EncodeError> {
            self.seen_outstanding.set(Some(self.outstanding.get()));
            for (index, chunk) in self.chunks.iter().enumerate() {
                if self.fail_after == Some(index) {
                    return Err(EncodeError::Encoder("scripted failure".to_string()));
                }
                if sink.push(index, chunk).is_break() {
                    return Err(EncodeError::Aborted);
                }
            }
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Recording responder
    // ------------------------------------------------------------------------

    #[derive(Debug, Default)]
    struct Recorded {
        status: Option<u16>,
        headers: Vec<(String, String)>,
        chunks: Vec<Vec<u8>>,
        finished: bool,
    }

    impl Recorded {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        fn body_len(&self) -> usize {
            self.chunks.iter().map(Vec::len).sum()
        }
    }

    #[derive(Default)]
    struct RecordingResponder {
        record: Rc<RefCell<Recorded>>,
        fail_open: bool,
        fail_on_chunk: Option<usize>,
    }

    struct RecordingBody {
        record: Rc<RefCell<Recorded>>,
        fail_on_chunk: Option<usize>,
    }

    impl CaptureResponder for RecordingResponder {
        type Error = String;
        type Body = RecordingBody;

        fn reject(self, status: u16) -> Result<(), String> {
            self.record.borrow_mut().status = Some(status);
            Ok(())
        }

        fn open(self, headers: &[(&str, &str)]) -> Result<RecordingBody, String> {
            if self.fail_open {
                return Err("connection reset".to_string());
            }
            let mut record = self.record.borrow_mut();
            record.status = Some(200);
            record.headers = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Ok(RecordingBody {
                record: self.record.clone(),
                fail_on_chunk: self.fail_on_chunk,
            })
        }
    }

    impl ResponseBody for RecordingBody {
        type Error = String;

        fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), String> {
            let mut record = self.record.borrow_mut();
            if self.fail_on_chunk == Some(record.chunks.len()) {
                return Err("send failed".to_string());
            }
            record.chunks.push(chunk.to_vec());
            Ok(())
        }

        fn finish(self) -> Result<(), String> {
            self.record.borrow_mut().finished = true;
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_jpeg_frame_sent_unchanged() {
        let jpeg = vec![0xFF, 0xD8, 1, 2, 3, 4, 5, 0xFF, 0xD9];
        let driver = FakeDriver::with_frame(PixelFormat::Jpeg, jpeg.clone());
        let encoder = ScriptedEncoder::new(&driver, &[]);
        let responder = RecordingResponder::default();
        let record = responder.record.clone();

        let outcome = handle_capture(&driver, &encoder, responder).unwrap();

        let record = record.borrow();
        assert_eq!(outcome.branch, CaptureBranch::Passthrough);
        assert_eq!(outcome.bytes_sent, jpeg.len());
        assert_eq!(record.status, Some(200));
        assert_eq!(record.chunks, vec![jpeg.clone()]);
        assert_eq!(record.header("Content-Type"), Some("image/jpeg"));
        assert_eq!(
            record.header("Content-Disposition"),
            Some("inline; filename=capture.jpg")
        );
        assert_eq!(record.header("Content-Length"), Some("9"));
        assert!(record.finished);
        assert!(encoder.seen_outstanding.get().is_none());
        assert_eq!(driver.outstanding.get(), 0);
    }

    #[test]
    fn test_raw_frame_streamed_as_chunks() {
        let driver = FakeDriver::with_frame(PixelFormat::Rgb565, vec![0; 16]);
        let encoder = ScriptedEncoder::new(&driver, &[10, 20, 5]);
        let responder = RecordingResponder::default();
        let record = responder.record.clone();

        let outcome = handle_capture(&driver, &encoder, responder).unwrap();

        let record = record.borrow();
        assert_eq!(outcome.branch, CaptureBranch::Encoded);
        assert_eq!(outcome.bytes_sent, 35);
        assert_eq!(outcome.chunks, 3);
        assert_eq!(record.body_len(), 35);
        assert_eq!(record.header("Content-Type"), Some("image/jpeg"));
        assert_eq!(record.header("Content-Length"), None);
        assert!(record.finished);
        // The frame is held while encoding and returned afterwards.
        assert_eq!(encoder.seen_outstanding.get(), Some(1));
        assert_eq!(driver.outstanding.get(), 0);
    }

    #[test]
    fn test_no_frame_yields_500_without_body() {
        let driver = FakeDriver::empty();
        let encoder = ScriptedEncoder::new(&driver, &[10]);
        let responder = RecordingResponder::default();
        let record = responder.record.clone();

        let result = handle_capture(&driver, &encoder, responder);

        assert!(matches!(result, Err(CaptureError::NoFrame)));
        let record = record.borrow();
        assert_eq!(record.status, Some(500));
        assert!(record.chunks.is_empty());
        assert!(record.headers.is_empty());
        assert_eq!(driver.outstanding.get(), 0);
    }

    #[test]
    fn test_send_failure_aborts_stream_and_releases_frame() {
        let driver = FakeDriver::with_frame(PixelFormat::Yuv422, vec![0; 16]);
        let encoder = ScriptedEncoder::new(&driver, &[8, 8, 8, 8]);
        let responder = RecordingResponder {
            fail_on_chunk: Some(1),
            ..Default::default()
        };
        let record = responder.record.clone();

        let result = handle_capture(&driver, &encoder, responder);

        assert!(matches!(result, Err(CaptureError::Response(_))));
        let record = record.borrow();
        assert_eq!(record.chunks.len(), 1);
        assert!(record.finished);
        assert_eq!(driver.outstanding.get(), 0);
    }

    #[test]
    fn test_encoder_failure_releases_frame() {
        let driver = FakeDriver::with_frame(PixelFormat::Grayscale, vec![0; 8]);
        let mut encoder = ScriptedEncoder::new(&driver, &[4, 4, 4]);
        encoder.fail_after = Some(2);
        let responder = RecordingResponder::default();
        let record = responder.record.clone();

        let result = handle_capture(&driver, &encoder, responder);

        match result {
            Err(CaptureError::Encode { bytes_sent, .. }) => assert_eq!(bytes_sent, 8),
            other => panic!("Expected Encode error, got {:?}", other),
        }
        assert!(record.borrow().finished);
        assert_eq!(driver.outstanding.get(), 0);
    }

    #[test]
    fn test_open_failure_releases_frame() {
        let driver = FakeDriver::with_frame(PixelFormat::Jpeg, vec![0xFF, 0xD8]);
        let encoder = ScriptedEncoder::new(&driver, &[]);
        let responder = RecordingResponder {
            fail_open: true,
            ..Default::default()
        };

        let result = handle_capture(&driver, &encoder, responder);

        assert!(matches!(result, Err(CaptureError::Response(_))));
        assert_eq!(driver.outstanding.get(), 0);
    }

    #[test]
    fn test_chunking_context_resets_on_first_index() {
        let mut body = RecordingBody {
            record: Rc::new(RefCell::new(Recorded::default())),
            fail_on_chunk: None,
        };
        let mut context = ChunkingContext::new(&mut body);

        assert!(context.push(0, &[1, 2, 3]).is_continue());
        assert!(context.push(1, &[4, 5]).is_continue());
        assert_eq!(context.len(), 5);

        assert!(context.push(0, &[6]).is_continue());
        let (len, chunks, error) = context.into_parts();
        assert_eq!((len, chunks), (1, 1));
        assert!(error.is_none());
    }

    #[test]
    fn test_chunked_headers_drop_content_length() {
        let headers = [
            ("Content-Type", CONTENT_TYPE_JPEG),
            ("Content-Disposition", CAPTURE_DISPOSITION),
            ("content-length", "1234"),
        ];

        assert_eq!(
            chunked_headers(&headers),
            vec![
                ("Content-Type", CONTENT_TYPE_JPEG),
                ("Content-Disposition", CAPTURE_DISPOSITION),
            ]
        );
    }
}
