//! # Monochrome Halftoning
//!
//! Converts an RGBA raster into the packed 1-bit bitmap a thermal head
//! prints. The pipeline per pixel:
//!
//! ```text
//! RGBA ──► luminance ──► composite over white ──► gamma ──► quantize
//!          (77/151/28)     (alpha blend)           (LUT)     (threshold or
//!                                                             error diffusion)
//! ```
//!
//! ## Determinism
//!
//! Same input, same parameters, same bitmap — always. Everything after
//! the one-time gamma table build is integer arithmetic, so there is no
//! accumulation of floating-point state and no platform-dependent
//! rounding inside the pixel loop.
//!
//! ## Error Diffusion
//!
//! The diffusion scheme is row-local: the quantization residual of each
//! pixel is split between the next pixel to the right and the pixel
//! directly below. The downward share is expressed in sixteenths so
//! callers can tune the split without leaving integer math.
//!
//! ## Bit Packing
//!
//! Output rows pack 8 pixels per byte, most significant bit first; a set
//! bit means "print dark". Rows are padded with white on the right.

use crate::error::ReciboError;

/// An immutable RGBA raster, 4 bytes per pixel.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wrap a raw RGBA buffer. The buffer length must be exactly
    /// `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ReciboError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ReciboError::Image(format!(
                "pixel buffer is {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Adopt a decoded image.
    pub fn from_rgba(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }

    /// RGBA components of one pixel.
    #[inline]
    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Rotate a quarter turn counter-clockwise (landscape emulation).
    pub fn rotate_ccw(&self) -> Self {
        let (w, h) = (self.width, self.height);
        let mut pixels = vec![0u8; self.pixels.len()];
        for y in 0..h {
            for x in 0..w {
                let src = (y as usize * w as usize + x as usize) * 4;
                // (x, y) lands at (y, w-1-x) in the rotated frame
                let dst = ((w - 1 - x) as usize * h as usize + y as usize) * 4;
                pixels[dst..dst + 4].copy_from_slice(&self.pixels[src..src + 4]);
            }
        }
        Self {
            width: h,
            height: w,
            pixels,
        }
    }
}

/// A packed 1-bit-per-pixel bitmap, MSB first, 1 = dark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonochromeBitmap {
    pub width: u32,
    pub height: u32,
    pub rows: Vec<u8>,
}

impl MonochromeBitmap {
    /// Bytes per packed row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }

    /// One packed row.
    pub fn row(&self, y: u32) -> &[u8] {
        let rb = self.row_bytes();
        &self.rows[y as usize * rb..(y as usize + 1) * rb]
    }
}

/// Halftoning parameters.
#[derive(Debug, Clone, Copy)]
pub struct Halftone {
    /// Luminance cut-off: pixels darker than this print.
    pub threshold: u8,
    /// Gamma correction exponent base (`value^(1/gamma)`), 0.1–10.0.
    pub gamma: f32,
    /// Diffuse the quantization residual instead of hard thresholding.
    pub error_diffusion: bool,
    /// Downward share of the residual, in sixteenths. The rest carries
    /// to the next pixel in the row.
    pub below_sixteenths: u8,
}

impl Default for Halftone {
    fn default() -> Self {
        Self {
            threshold: 128,
            gamma: 1.0,
            error_diffusion: true,
            below_sixteenths: 8,
        }
    }
}

impl Halftone {
    /// Encode an RGBA raster to a packed monochrome bitmap.
    pub fn encode(&self, image: &RasterImage) -> MonochromeBitmap {
        let lut = gamma_table(self.gamma);
        let w = image.width as usize;
        let row_bytes = w.div_ceil(8);
        let mut rows = vec![0u8; row_bytes * image.height as usize];
        let threshold = i32::from(self.threshold);
        let below_share = i32::from(self.below_sixteenths.min(16));

        let mut below = vec![0i32; w];
        for y in 0..image.height {
            let mut carry = 0i32;
            let mut next_below = vec![0i32; w];
            for x in 0..image.width {
                let [r, g, b, a] = image.pixel(x, y);
                // Standard weights, scaled by 256
                let lum = (77 * u32::from(r) + 151 * u32::from(g) + 28 * u32::from(b)) >> 8;
                // Composite against white paper
                let a = u32::from(a);
                let v = (lum * a + 255 * (255 - a) + 127) / 255;
                let v = i32::from(lut[v as usize]) + carry + below[x as usize];

                let dark = v < threshold;
                if dark {
                    let i = y as usize * row_bytes + x as usize / 8;
                    rows[i] |= 0x80u8 >> (x % 8);
                }

                if self.error_diffusion {
                    let err = v - if dark { 0 } else { 255 };
                    let down = err * below_share / 16;
                    next_below[x as usize] = down;
                    carry = err - down;
                } else {
                    carry = 0;
                }
            }
            below = next_below;
        }

        MonochromeBitmap {
            width: image.width,
            height: image.height,
            rows,
        }
    }
}

/// Build the 256-entry gamma lookup table for `value^(1/gamma)`.
///
/// Gamma is clamped to its documented 0.1–10.0 range. The table is the
/// only floating-point step of the pipeline.
fn gamma_table(gamma: f32) -> [u8; 256] {
    let gamma = f64::from(gamma.clamp(0.1, 10.0));
    let mut table = [0u8; 256];
    for (v, slot) in table.iter_mut().enumerate() {
        let norm = v as f64 / 255.0;
        *slot = (norm.powf(1.0 / gamma) * 255.0).round() as u8;
    }
    table
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RasterImage {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        RasterImage::new(width, height, pixels).unwrap()
    }

    #[test]
    fn test_buffer_length_checked() {
        assert!(RasterImage::new(2, 2, vec![0u8; 15]).is_err());
        assert!(RasterImage::new(2, 2, vec![0u8; 16]).is_ok());
    }

    #[test]
    fn test_black_prints_white_does_not() {
        let ht = Halftone::default();
        let black = ht.encode(&solid(16, 2, [0, 0, 0, 255]));
        assert!(black.rows.iter().all(|&b| b == 0xFF));
        let white = ht.encode(&solid(16, 2, [255, 255, 255, 255]));
        assert!(white.rows.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_transparent_reads_as_paper() {
        // Fully transparent black composites to white and never prints
        let ht = Halftone::default();
        let out = ht.encode(&solid(8, 1, [0, 0, 0, 0]));
        assert_eq!(out.rows, vec![0x00]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let mut pixels = Vec::new();
        for i in 0..(32 * 8 * 4) {
            pixels.push((i * 37 % 256) as u8);
        }
        let image = RasterImage::new(32, 8, pixels).unwrap();
        let ht = Halftone {
            threshold: 100,
            gamma: 1.8,
            error_diffusion: true,
            below_sixteenths: 8,
        };
        assert_eq!(ht.encode(&image), ht.encode(&image));
    }

    #[test]
    fn test_diffusion_differs_from_threshold() {
        // A mid-gray field thresholds to all-white but diffuses to a
        // speckled pattern of roughly half coverage
        let image = solid(32, 8, [150, 150, 150, 255]);
        let plain = Halftone {
            error_diffusion: false,
            ..Default::default()
        }
        .encode(&image);
        let diffused = Halftone::default().encode(&image);
        assert!(plain.rows.iter().all(|&b| b == 0x00));
        let printed: u32 = diffused.rows.iter().map(|b| b.count_ones()).sum();
        assert!(printed > 0, "diffusion should print some dots");
        let coverage = printed as f32 / (32.0 * 8.0);
        assert!(
            (0.25..0.6).contains(&coverage),
            "coverage {coverage} out of range"
        );
    }

    #[test]
    fn test_gamma_lightens_midtones() {
        // gamma > 1 lifts midtone luminance, so fewer dots print
        let image = solid(32, 8, [110, 110, 110, 255]);
        let neutral = Halftone {
            gamma: 1.0,
            ..Default::default()
        }
        .encode(&image);
        let lifted = Halftone {
            gamma: 3.0,
            ..Default::default()
        }
        .encode(&image);
        let dots = |bm: &MonochromeBitmap| -> u32 { bm.rows.iter().map(|b| b.count_ones()).sum() };
        assert!(dots(&lifted) < dots(&neutral));
    }

    #[test]
    fn test_row_padding_stays_white() {
        // 12 px wide: the last 4 bits of each row are padding
        let bm = Halftone::default().encode(&solid(12, 2, [0, 0, 0, 255]));
        assert_eq!(bm.row_bytes(), 2);
        for y in 0..2 {
            assert_eq!(bm.row(y)[0], 0xFF);
            assert_eq!(bm.row(y)[1], 0xF0);
        }
    }

    #[test]
    fn test_rotate_ccw_geometry() {
        // 2x1 image: left pixel black, right pixel white
        let pixels = vec![0, 0, 0, 255, 255, 255, 255, 255];
        let image = RasterImage::new(2, 1, pixels).unwrap();
        let rotated = image.rotate_ccw();
        assert_eq!((rotated.width, rotated.height), (1, 2));
        // Right column becomes the top row after a CCW quarter turn
        assert_eq!(rotated.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(rotated.pixel(0, 1), [0, 0, 0, 255]);
    }
}
