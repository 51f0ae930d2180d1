//! # Raster Rendering
//!
//! Conversion of continuous-tone images to the 1-bit bitmaps printers
//! actually draw.
//!
//! - [`halftone`]: luminance/gamma pipeline with threshold or
//!   error-diffusion quantization

pub mod halftone;

pub use halftone::{Halftone, MonochromeBitmap, RasterImage};
