//! Pixel blend modes for the Combine node

use serde::{Deserialize, Serialize};

use crate::image_data::ImageData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    Add,
    Multiply,
    Screen,
    Overlay,
    /// Linear mix by the alpha factor. Unrecognised modes fall back to this.
    #[default]
    #[serde(other)]
    Blend,
}

impl BlendMode {
    pub const ALL: [BlendMode; 5] = [
        BlendMode::Blend,
        BlendMode::Add,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Blend => "blend",
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
        }
    }

    /// Combine two normalized channel values. The result is not clamped.
    pub fn apply(&self, x1: f32, x2: f32, alpha: f32) -> f32 {
        match self {
            Self::Add => x1 + x2,
            Self::Multiply => x1 * x2,
            Self::Screen => 1.0 - (1.0 - x1) * (1.0 - x2),
            // Threshold on the base channel
            Self::Overlay => {
                if x1 < 0.5 {
                    2.0 * x1 * x2
                } else {
                    1.0 - 2.0 * (1.0 - x1) * (1.0 - x2)
                }
            }
            Self::Blend => {
                let a = alpha.clamp(0.0, 1.0);
                x1 * (1.0 - a) + x2 * a
            }
        }
    }
}

/// Blend `b` onto `a` pixel by pixel.
///
/// The result takes `a`'s dimensions and is always opaque. Pixels of `a`
/// that fall outside `b` are combined with a zero sample.
pub fn combine(a: &ImageData, b: &ImageData, mode: BlendMode, alpha: f32) -> ImageData {
    ImageData::from_fn(a.width, a.height, |x, y| {
        let pa = a.get_pixel(x, y);
        let pb = b.try_pixel(x, y).unwrap_or([0; 4]);
        let mut out = [0u8, 0, 0, 255];
        for c in 0..3 {
            let x1 = pa[c] as f32 / 255.0;
            let x2 = pb[c] as f32 / 255.0;
            out[c] = to_byte(mode.apply(x1, x2, alpha));
        }
        out
    })
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
