//! JPEG conversion through the driver's `frame2jpg_cb`.
//!
//! The driver calls back once per compressed chunk with a running index.
//! Returning 0 from the callback stops the conversion.

use std::ffi::c_void;
use std::ops::ControlFlow;

use camserve_core::{ChunkSink, EncodeError, Frame, JpegEncoder};
use esp_idf_svc::sys::camera::frame2jpg_cb;

use crate::camera::EspFrame;

/// Encoder backed by the camera component's software JPEG converter.
#[derive(Debug, Default, Clone, Copy)]
pub struct EspJpegEncoder;

struct Trampoline<'a> {
    sink: &'a mut dyn ChunkSink,
    aborted: bool,
}

unsafe extern "C" fn on_chunk(arg: *mut c_void, index: usize, data: *const c_void, len: usize) -> usize {
    let ctx = &mut *(arg as *mut Trampoline<'_>);
    let chunk = if data.is_null() || len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(data as *const u8, len)
    };

    match ctx.sink.push(index, chunk) {
        ControlFlow::Continue(()) => len,
        ControlFlow::Break(()) => {
            ctx.aborted = true;
            0
        }
    }
}

impl JpegEncoder<EspFrame> for EspJpegEncoder {
    fn encode(
        &self,
        frame: &EspFrame,
        quality: u8,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), EncodeError> {
        let info = frame.info();
        if let Some(expected) = info.raw_len() {
            if frame.len() < expected {
                return Err(EncodeError::ShortFrame {
                    expected,
                    actual: frame.len(),
                });
            }
        } else {
            return Err(EncodeError::UnsupportedFormat(info.format));
        }

        let mut ctx = Trampoline {
            sink,
            aborted: false,
        };
        let ok = unsafe {
            frame2jpg_cb(
                frame.as_ptr(),
                quality,
                Some(on_chunk),
                &mut ctx as *mut Trampoline<'_> as *mut c_void,
            )
        };

        match (ok, ctx.aborted) {
            (true, _) => Ok(()),
            (false, true) => Err(EncodeError::Aborted),
            (false, false) => Err(EncodeError::Encoder("frame2jpg_cb failed".to_string())),
        }
    }
}
