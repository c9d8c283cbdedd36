use crate::error::{ReplayError, Result};
use crate::types::{Capture, CaptureRect, Rgb};

/// Decoded, row-major RGB view of an image.
///
/// Pixels are decoded once on construction so that the matcher can read them
/// by index (`y * width + x`) without touching the source encoding again.
/// Zero-sized buffers cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgb>,
}

impl PixelBuffer {
    /// Decode a BGRA screen capture. Row padding (`bytes_per_row > width * 4`)
    /// is skipped.
    pub fn from_capture(capture: &Capture) -> Result<Self> {
        let (w, h) = (capture.width, capture.height);
        check_dims(w, h)?;
        let bpr = capture.bytes_per_row as usize;
        if bpr < w as usize * 4 {
            return Err(ReplayError::InvalidPattern(format!(
                "capture row stride {} is shorter than {} pixels",
                bpr, w
            )));
        }
        let needed = bpr * (h as usize - 1) + w as usize * 4;
        if capture.data.len() < needed {
            return Err(ReplayError::InvalidPattern(format!(
                "capture holds {} bytes, {}x{} needs {}",
                capture.data.len(),
                w,
                h,
                needed
            )));
        }

        let mut pixels = Vec::with_capacity(w as usize * h as usize);
        for row in capture.data.chunks(bpr).take(h as usize) {
            for px in row[..w as usize * 4].chunks_exact(4) {
                pixels.push(Rgb::new(px[2], px[1], px[0]));
            }
        }
        Ok(Self { width: w, height: h, pixels })
    }

    /// Build from packed RGB triples.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Result<Self> {
        check_dims(width, height)?;
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(ReplayError::InvalidPattern(format!(
                "{}x{} variant needs {} rgb bytes, got {}",
                width,
                height,
                expected,
                rgb.len()
            )));
        }
        let pixels = rgb
            .chunks_exact(3)
            .map(|c| Rgb::new(c[0], c[1], c[2]))
            .collect();
        Ok(Self { width, height, pixels })
    }

    /// Build by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Rgb) -> Result<Self> {
        check_dims(width, height)?;
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Ok(Self { width, height, pixels })
    }

    pub fn from_image(image: &image::RgbImage) -> Result<Self> {
        Self::from_rgb(image.width(), image.height(), image.as_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bounds-checked pixel read.
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<Rgb> {
        if x >= self.width || y >= self.height {
            return Err(ReplayError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.pixel(x, y))
    }

    /// Hot-path read for callers that already clamped their coordinates.
    #[inline]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> Rgb {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Copy a sub-rectangle into a new buffer, e.g. to turn part of a screen
    /// capture into a pattern variant.
    pub fn crop(&self, rect: CaptureRect) -> Result<Self> {
        check_dims(rect.w, rect.h)?;
        let right = rect.l.checked_add(rect.w).filter(|r| *r <= self.width);
        let bottom = rect.t.checked_add(rect.h).filter(|b| *b <= self.height);
        if right.is_none() || bottom.is_none() {
            return Err(ReplayError::OutOfBounds {
                x: rect.l.saturating_add(rect.w).saturating_sub(1),
                y: rect.t.saturating_add(rect.h).saturating_sub(1),
                width: self.width,
                height: self.height,
            });
        }
        Self::from_fn(rect.w, rect.h, |x, y| self.pixel(rect.l + x, rect.t + y))
    }

    /// Packed RGB triples, row-major.
    pub fn to_rgb(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| [p.r, p.g, p.b]).collect()
    }

    /// Encode back into a BGRA capture with opaque alpha.
    pub fn to_capture(&self) -> Capture {
        let data = self.pixels.iter().flat_map(|p| [p.b, p.g, p.r, 255]).collect();
        Capture {
            data,
            width: self.width,
            height: self.height,
            bytes_per_row: self.width * 4,
        }
    }
}

fn check_dims(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ReplayError::InvalidPattern(format!(
            "buffer must not be empty, got {}x{}",
            width, height
        )));
    }
    Ok(())
}
