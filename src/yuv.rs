//! Stateless pixel format conversions for capture collaborators.
//!
//! Semi-planar layouts are NV21 (`Y` plane followed by interleaved `V`/`U`) and NV12
//! (interleaved `U`/`V`); the rotations work on either since they move chroma pairs as a
//! unit. All functions expect even dimensions.

use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};
use rayon::slice::{ParallelSlice, ParallelSliceMut};

use crate::frame::Rotation;

#[derive(thiserror::Error, Eq, PartialEq, Clone, Debug)]
pub enum ConversionError {
    #[error("Buffer is too small: expected at least {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Invalid dimensions {width}x{height}, both must be even and non-zero")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("Rotation by {0} degrees is not a conversion")]
    UnsupportedRotation(u32),
}

const fn check_dimensions(width: u32, height: u32) -> Result<(usize, usize), ConversionError> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(ConversionError::InvalidDimensions { width, height });
    }
    Ok((width as usize, height as usize))
}

const fn check_len(buffer: &[u8], expected: usize) -> Result<(), ConversionError> {
    if buffer.len() < expected {
        return Err(ConversionError::BufferTooSmall { expected, actual: buffer.len() });
    }
    Ok(())
}

/// Size in bytes of a 4:2:0 frame.
#[must_use]
#[inline]
pub const fn yuv420_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3 / 2
}

/// Borrowed planes of an I420 frame with their row strides.
#[derive(Clone, Copy, Debug)]
pub struct I420Planes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub stride_y: usize,
    pub stride_u: usize,
    pub stride_v: usize,
}

impl<'a> I420Planes<'a> {
    /// Planes of a tightly packed I420 buffer.
    ///
    /// # Errors
    ///
    /// Fails for odd dimensions or a buffer shorter than one frame.
    #[inline]
    pub fn packed(data: &'a [u8], width: u32, height: u32) -> Result<Self, ConversionError> {
        let (w, h) = check_dimensions(width, height)?;
        check_len(data, yuv420_len(width, height))?;

        let (y, chroma) = data.split_at(w * h);
        let (u, v) = chroma.split_at(w * h / 4);
        Ok(Self { y, u, v, stride_y: w, stride_u: w / 2, stride_v: w / 2 })
    }
}

fn plane_len(stride: usize, width: usize, rows: usize) -> usize {
    (rows - 1) * stride + width
}

/// Repacks I420 planes into one NV21 buffer, honoring each plane's stride.
///
/// # Errors
///
/// Fails for odd dimensions, strides narrower than the plane or planes that are too short.
pub fn i420_to_nv21(planes: &I420Planes<'_>, width: u32, height: u32) -> Result<Vec<u8>, ConversionError> {
    let (w, h) = check_dimensions(width, height)?;
    let (cw, ch) = (w / 2, h / 2);
    if planes.stride_y < w || planes.stride_u < cw || planes.stride_v < cw {
        return Err(ConversionError::InvalidDimensions { width, height });
    }
    check_len(planes.y, plane_len(planes.stride_y, w, h))?;
    check_len(planes.u, plane_len(planes.stride_u, cw, ch))?;
    check_len(planes.v, plane_len(planes.stride_v, cw, ch))?;

    let mut output = vec![0; yuv420_len(width, height)];
    let (luma, chroma) = output.split_at_mut(w * h);

    luma.par_chunks_mut(w).enumerate().for_each(|(row, dst)| {
        let start = row * planes.stride_y;
        dst.copy_from_slice(&planes.y[start..start + w]);
    });
    chroma.par_chunks_mut(w).enumerate().for_each(|(row, dst)| {
        let v = &planes.v[row * planes.stride_v..];
        let u = &planes.u[row * planes.stride_u..];
        for (col, pair) in dst.chunks_exact_mut(2).enumerate() {
            pair[0] = v[col];
            pair[1] = u[col];
        }
    });

    Ok(output)
}

/// Converts YV12 (`Y`, `V`, `U` planes) to packed semi-planar NV12.
///
/// # Errors
///
/// Fails for odd dimensions or a short input.
pub fn yv12_to_nv12(input: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConversionError> {
    let (w, h) = check_dimensions(width, height)?;
    check_len(input, yuv420_len(width, height))?;

    let frame = w * h;
    let quarter = frame / 4;
    let mut output = vec![0; yuv420_len(width, height)];
    output[..frame].copy_from_slice(&input[..frame]);

    let v = &input[frame..frame + quarter];
    let u = &input[frame + quarter..frame + 2 * quarter];
    output[frame..].par_chunks_mut(2).enumerate().for_each(|(i, pair)| {
        pair[0] = u[i];
        pair[1] = v[i];
    });

    Ok(output)
}

/// Converts YV12 to I420 by swapping the chroma planes.
///
/// # Errors
///
/// Fails for odd dimensions or a short input.
pub fn yv12_to_i420(input: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConversionError> {
    let (w, h) = check_dimensions(width, height)?;
    check_len(input, yuv420_len(width, height))?;

    let frame = w * h;
    let quarter = frame / 4;
    let mut output = Vec::with_capacity(frame + 2 * quarter);
    output.extend_from_slice(&input[..frame]);
    output.extend_from_slice(&input[frame + quarter..frame + 2 * quarter]);
    output.extend_from_slice(&input[frame..frame + quarter]);

    Ok(output)
}

/// Rotates a semi-planar frame 90 degrees clockwise. The result is `height x width`.
///
/// # Errors
///
/// Fails for odd dimensions or a short input.
pub fn rotate_yuv420_90(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConversionError> {
    let (w, h) = check_dimensions(width, height)?;
    check_len(data, yuv420_len(width, height))?;

    let frame = w * h;
    let mut output = vec![0; yuv420_len(width, height)];
    let (luma, chroma) = output.split_at_mut(frame);

    luma.par_chunks_mut(h).enumerate().for_each(|(x, dst)| {
        for (k, y) in (0..h).rev().enumerate() {
            dst[k] = data[y * w + x];
        }
    });

    // Filled back to front, one chroma column pair at a time.
    let mut i = chroma.len();
    for x in (1..w).rev().step_by(2) {
        for y in 0..h / 2 {
            let row = frame + y * w;
            chroma[i - 1] = data[row + x];
            chroma[i - 2] = data[row + x - 1];
            i -= 2;
        }
    }

    Ok(output)
}

/// Rotates a semi-planar frame 180 degrees. Applying it twice yields the input.
///
/// # Errors
///
/// Fails for odd dimensions or a short input.
pub fn rotate_yuv420_180(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConversionError> {
    let (w, h) = check_dimensions(width, height)?;
    let len = yuv420_len(width, height);
    check_len(data, len)?;

    let frame = w * h;
    let mut output = vec![0; len];
    let (luma, chroma) = output.split_at_mut(frame);

    luma.par_iter_mut().enumerate().for_each(|(i, dst)| *dst = data[frame - 1 - i]);
    chroma.par_chunks_mut(2).zip(data[frame..len].par_chunks(2).rev()).for_each(|(dst, src)| {
        dst.copy_from_slice(src);
    });

    Ok(output)
}

/// Rotates a semi-planar frame 270 degrees clockwise. The result is `height x width`.
///
/// # Errors
///
/// Fails for odd dimensions or a short input.
pub fn rotate_yuv420_270(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConversionError> {
    let (w, h) = check_dimensions(width, height)?;
    check_len(data, yuv420_len(width, height))?;

    let frame = w * h;
    let mut output = vec![0; yuv420_len(width, height)];
    let (luma, chroma) = output.split_at_mut(frame);

    luma.par_chunks_mut(h).enumerate().for_each(|(row, dst)| {
        let x = w - 1 - row;
        for (y, value) in dst.iter_mut().enumerate() {
            *value = data[y * w + x];
        }
    });
    chroma.par_chunks_mut(h).enumerate().for_each(|(row, dst)| {
        let x = (w / 2 - 1 - row) * 2;
        for (y, pair) in dst.chunks_exact_mut(2).enumerate() {
            let src = frame + y * w + x;
            pair.copy_from_slice(&data[src..src + 2]);
        }
    });

    Ok(output)
}

/// Dispatches to the rotation matching `rotation`.
///
/// # Errors
///
/// [`Rotation::Deg0`] is rejected with [`ConversionError::UnsupportedRotation`]; the rest as the
/// individual rotations.
#[inline]
pub fn rotate_yuv420(data: &[u8], width: u32, height: u32, rotation: Rotation) -> Result<Vec<u8>, ConversionError> {
    match rotation {
        Rotation::Deg0 => Err(ConversionError::UnsupportedRotation(0)),
        Rotation::Deg90 => rotate_yuv420_90(data, width, height),
        Rotation::Deg180 => rotate_yuv420_180(data, width, height),
        Rotation::Deg270 => rotate_yuv420_270(data, width, height),
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum BitmapConfig {
    /// Bytes in `R, G, B, A` order.
    Argb8888,
    /// Two bytes per pixel, high byte first.
    Rgb565,
}

impl BitmapConfig {
    #[must_use]
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Argb8888 => 4,
            Self::Rgb565 => 2,
        }
    }
}

fn gray_level(r: f64, g: f64, b: f64) -> u8 {
    (0.2989 * r + 0.5870 * g + 0.1140 * b) as u8
}

/// Converts bitmap pixels to one 8-bit gray value per pixel.
///
/// # Errors
///
/// Fails if `pixels` holds fewer than `width * height` pixels.
pub fn bitmap_to_gray(pixels: &[u8], width: u32, height: u32, config: BitmapConfig) -> Result<Vec<u8>, ConversionError> {
    let count = width as usize * height as usize;
    let bpp = config.bytes_per_pixel();
    check_len(pixels, count * bpp)?;

    let mut gray = vec![0; count];
    if count == 0 {
        return Ok(gray);
    }
    gray.par_iter_mut().zip(pixels[..count * bpp].par_chunks_exact(bpp)).for_each(|(out, px)| {
        *out = match config {
            BitmapConfig::Argb8888 => gray_level(f64::from(px[0]), f64::from(px[1]), f64::from(px[2])),
            BitmapConfig::Rgb565 => {
                let r = px[0] & 0xF8;
                let g = (u16::from(px[0] & 0x07) << 5) + u16::from((px[1] & 0xE0) >> 5);
                let b = (px[1] & 0x1F) << 3;
                gray_level(f64::from(r), f64::from(g), f64::from(b))
            }
        };
    });

    Ok(gray)
}
