//! Software JPEG encoder that streams its output in fixed-size chunks.

use std::io::{self, Write};
use std::ops::ControlFlow;

use camserve_core::{ChunkSink, EncodeError, Frame, JpegEncoder, PixelFormat};
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use crate::pattern;

/// Size of each chunk handed to the sink (the last one may be shorter).
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Encodes raw frames with the `image` crate's baseline JPEG encoder.
#[derive(Debug, Clone)]
pub struct SoftwareJpegEncoder {
    chunk_size: usize,
}

impl SoftwareJpegEncoder {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for SoftwareJpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Frame + ?Sized> JpegEncoder<F> for SoftwareJpegEncoder {
    fn encode(&self, frame: &F, quality: u8, sink: &mut dyn ChunkSink) -> Result<(), EncodeError> {
        let info = frame.info();
        let pixels = pattern::to_encodable(frame.data(), &info)?;
        let color = match info.format {
            PixelFormat::Grayscale => ExtendedColorType::L8,
            _ => ExtendedColorType::Rgb8,
        };

        let mut writer = ChunkWriter::new(sink, self.chunk_size);
        let encoded = {
            let mut encoder = ImageJpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(&pixels, info.width, info.height, color)
        };

        match encoded {
            Ok(()) => writer.finish(),
            Err(_) if writer.aborted => Err(EncodeError::Aborted),
            Err(e) => Err(EncodeError::Encoder(e.to_string())),
        }
    }
}

/// Buffers encoder output and forwards it to the sink one chunk at a time.
struct ChunkWriter<'a> {
    sink: &'a mut dyn ChunkSink,
    buf: Vec<u8>,
    chunk_size: usize,
    index: usize,
    aborted: bool,
}

impl<'a> ChunkWriter<'a> {
    fn new(sink: &'a mut dyn ChunkSink, chunk_size: usize) -> Self {
        Self {
            sink,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
            index: 0,
            aborted: false,
        }
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let flow = self.sink.push(self.index, &self.buf);
        self.index += 1;
        self.buf.clear();
        if let ControlFlow::Break(()) = flow {
            self.aborted = true;
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "chunk consumer stopped",
            ));
        }
        Ok(())
    }

    /// Push the trailing partial chunk.
    fn finish(mut self) -> Result<(), EncodeError> {
        self.emit().map_err(|_| EncodeError::Aborted)
    }
}

impl Write for ChunkWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.aborted {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "chunk consumer stopped",
            ));
        }
        let room = self.chunk_size - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == self.chunk_size {
            self.emit()?;
        }
        Ok(n)
    }

    // Chunks are cut by size only; the tail goes out in `finish`.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
