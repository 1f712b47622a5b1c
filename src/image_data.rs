//! Raster buffers passed between nodes

use std::sync::Arc;

use base64::Engine as _;

use crate::color::Color;
use crate::error::ComputeError;

/// Raw RGBA image data shared between nodes.
///
/// The pixel storage is reference counted and never mutated once built, so
/// downstream nodes can hold on to an upstream output without copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major
    pub pixels: Arc<Vec<u8>>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageData {
    /// Create new image data from raw RGBA pixels
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            pixels: Arc::new(pixels),
            width,
            height,
        }
    }

    /// Create a solid color image
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let pixels: Vec<u8> = (0..width as usize * height as usize)
            .flat_map(|_| color.to_array())
            .collect();
        Self::new(pixels, width, height)
    }

    /// Fully transparent image
    pub fn blank(width: u32, height: u32) -> Self {
        Self::solid(width, height, Color::TRANSPARENT)
    }

    /// Build an image by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self::new(pixels, width, height)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = self.index(x, y);
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    /// Pixel at (x, y), or `None` outside the image
    pub fn try_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.width && y < self.height).then(|| self.get_pixel(x, y))
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Size in bytes
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// True when both images share the same pixel storage
    pub fn shares_pixels(&self, other: &ImageData) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// PNG data URL, for handing previews to a browser
    pub fn to_data_url(&self) -> Result<String, ComputeError> {
        let png = encode_png(self)?;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

/// Clamp requested dimensions to at least 1x1.
///
/// Parameters arrive as floats from persisted graphs, so they are floored
/// first. Anything above `max` is rejected.
pub fn checked_dimensions(width: f64, height: f64, max: u32) -> Result<(u32, u32), ComputeError> {
    let floor = |v: f64| {
        if v.is_finite() && v >= 1.0 {
            v.floor().min(u32::MAX as f64) as u32
        } else {
            1
        }
    };
    let (w, h) = (floor(width), floor(height));
    if w > max || h > max {
        return Err(ComputeError::DimensionTooLarge {
            width: w,
            height: h,
            max,
        });
    }
    Ok((w, h))
}

/// Encode image to PNG bytes
pub fn encode_png(data: &ImageData) -> Result<Vec<u8>, ComputeError> {
    use image::ImageEncoder;
    use std::io::Cursor;

    let mut buffer = Cursor::new(Vec::new());

    let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
    encoder
        .write_image(
            &data.pixels,
            data.width,
            data.height,
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| ComputeError::Image(format!("Failed to encode PNG: {}", e)))?;

    Ok(buffer.into_inner())
}
