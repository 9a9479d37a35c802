//! Synthetic frame content and pixel conversions.
//!
//! Frames are eight vertical colour bars. Raw layouts follow the sensor:
//! RGB565 is big-endian, YUV422 is packed YUYV.

use camserve_core::{EncodeError, FrameInfo, PixelFormat};

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Colour-bar image as packed RGB888.
pub fn color_bars_rgb(width: u32, height: u32) -> Vec<u8> {
    let width = width as usize;
    let mut out = Vec::with_capacity(width * height as usize * 3);
    for _ in 0..height {
        for x in 0..width {
            let bar = x * BARS.len() / width.max(1);
            out.extend_from_slice(&BARS[bar]);
        }
    }
    out
}

/// Colour-bar image in `format`. `None` for JPEG, which needs an encoder.
pub fn color_bars(width: u32, height: u32, format: PixelFormat) -> Option<Vec<u8>> {
    let rgb = color_bars_rgb(width, height);
    match format {
        PixelFormat::Rgb888 => Some(rgb),
        PixelFormat::Rgb565 => Some(rgb.chunks_exact(3).flat_map(rgb_to_565).collect()),
        PixelFormat::Grayscale => Some(rgb.chunks_exact(3).map(luma).collect()),
        PixelFormat::Yuv422 => Some(rgb_to_yuyv(&rgb)),
        PixelFormat::Jpeg => None,
    }
}

/// Expand a raw frame to RGB888 (or keep it single-channel for grayscale).
pub fn to_encodable(data: &[u8], info: &FrameInfo) -> Result<Vec<u8>, EncodeError> {
    let expected = info
        .raw_len()
        .ok_or(EncodeError::UnsupportedFormat(info.format))?;
    if data.len() < expected {
        return Err(EncodeError::ShortFrame {
            expected,
            actual: data.len(),
        });
    }
    let data = &data[..expected];

    let out = match info.format {
        PixelFormat::Rgb888 | PixelFormat::Grayscale => data.to_vec(),
        PixelFormat::Rgb565 => data
            .chunks_exact(2)
            .flat_map(|px| rgb_from_565([px[0], px[1]]))
            .collect(),
        PixelFormat::Yuv422 => yuyv_to_rgb(data),
        PixelFormat::Jpeg => return Err(EncodeError::UnsupportedFormat(info.format)),
    };
    Ok(out)
}

fn rgb_to_565(rgb: &[u8]) -> [u8; 2] {
    let (r, g, b) = (rgb[0] as u16, rgb[1] as u16, rgb[2] as u16);
    let px = ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3);
    px.to_be_bytes()
}

fn rgb_from_565(bytes: [u8; 2]) -> [u8; 3] {
    let px = u16::from_be_bytes(bytes);
    let r = ((px >> 11) & 0x1F) as u8;
    let g = ((px >> 5) & 0x3F) as u8;
    let b = (px & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn luma(rgb: &[u8]) -> u8 {
    let y = 299 * rgb[0] as u32 + 587 * rgb[1] as u32 + 114 * rgb[2] as u32;
    (y / 1000) as u8
}

fn rgb_to_yuyv(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 2);
    for pair in rgb.chunks(6) {
        let p0 = &pair[0..3];
        // Odd widths repeat the last pixel.
        let p1 = if pair.len() == 6 { &pair[3..6] } else { p0 };
        let (y0, u0, v0) = yuv(p0);
        let (y1, u1, v1) = yuv(p1);
        out.extend_from_slice(&[
            y0,
            ((u0 as u16 + u1 as u16) / 2) as u8,
            y1,
            ((v0 as u16 + v1 as u16) / 2) as u8,
        ]);
    }
    out
}

fn yuv(rgb: &[u8]) -> (u8, u8, u8) {
    let (r, g, b) = (rgb[0] as f32, rgb[1] as f32, rgb[2] as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
    (clamp(y), clamp(u), clamp(v))
}

fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    let quads = data.chunks_exact(4);
    let tail = quads.remainder();
    let mut v = 0.0;
    for quad in quads {
        let u = quad[1] as f32 - 128.0;
        v = quad[3] as f32 - 128.0;
        push_yuv(&mut out, quad[0], u, v);
        push_yuv(&mut out, quad[2], u, v);
    }
    // Odd pixel count: the last pixel has Y and U only; borrow the previous V.
    if let [y, u] = *tail {
        push_yuv(&mut out, y, u as f32 - 128.0, v);
    }
    out
}

fn push_yuv(out: &mut Vec<u8>, y: u8, u: f32, v: f32) {
    let y = y as f32;
    out.extend_from_slice(&[
        clamp(y + 1.402 * v),
        clamp(y - 0.344 * u - 0.714 * v),
        clamp(y + 1.772 * u),
    ]);
}

fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
