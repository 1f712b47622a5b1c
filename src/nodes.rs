//! Node types, their parameters and compute functions

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blend::{self, BlendMode};
use crate::color::Color;
use crate::error::{ComputeError, GraphError};
use crate::image_data::{checked_dimensions, ImageData};
use crate::perlin::{Perlin, DEFAULT_SEED};

/// Images keyed by port name, used for both inputs and outputs
pub type PortMap = HashMap<String, ImageData>;

/// Name of the single image port most nodes expose
pub const IMAGE_PORT: &str = "image";

/// All available node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    CreateImage,
    Gradient,
    PerlinNoise,
    Combine,
    Display,
}

impl NodeType {
    pub const ALL: [NodeType; 5] = [
        NodeType::CreateImage,
        NodeType::Gradient,
        NodeType::PerlinNoise,
        NodeType::Combine,
        NodeType::Display,
    ];

    /// Type tag used in saved graphs
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateImage => "CreateImage",
            Self::Gradient => "Gradient",
            Self::PerlinNoise => "PerlinNoise",
            Self::Combine => "Combine",
            Self::Display => "Display",
        }
    }

    /// Get the display name for this node type
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateImage => "Create Image",
            Self::Gradient => "Add Gradient",
            Self::PerlinNoise => "Perlin Noise",
            Self::Combine => "Combine Images",
            Self::Display => "Display Image",
        }
    }

    /// Input port names, in order
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            Self::CreateImage | Self::Gradient | Self::PerlinNoise => &[],
            Self::Combine => &["A", "B"],
            Self::Display => &[IMAGE_PORT],
        }
    }

    /// Output port names, in order
    pub fn outputs(&self) -> &'static [&'static str] {
        match self {
            Self::CreateImage | Self::Gradient | Self::PerlinNoise | Self::Combine => &[IMAGE_PORT],
            Self::Display => &[], // Display has no outputs
        }
    }

    pub fn has_input(&self, port: &str) -> bool {
        self.inputs().contains(&port)
    }

    pub fn has_output(&self, port: &str) -> bool {
        self.outputs().contains(&port)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| GraphError::UnknownNodeType(s.to_string()))
    }
}

/// Placement on the editor canvas. Not used by evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Uuid,
    pub position: Position,
    pub properties: NodeProperties,
}

impl Node {
    pub fn new(node_type: NodeType, position: Position) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            properties: NodeProperties::for_type(node_type),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.properties.node_type()
    }
}

/// Settings shared by every compute call in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeContext {
    /// Size of the blank image Combine produces with no inputs
    pub default_width: u32,
    pub default_height: u32,
    /// Largest width or height a generator may allocate
    pub max_dimension: u32,
}

impl Default for ComputeContext {
    fn default() -> Self {
        Self {
            default_width: 256,
            default_height: 256,
            max_dimension: 8192,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateImageParams {
    pub width: f64,
    pub height: f64,
    pub color: Color,
}

impl Default for CreateImageParams {
    fn default() -> Self {
        Self {
            width: 256.0,
            height: 256.0,
            color: Color::rgb(0x8b, 0x5c, 0xf6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientDirection {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientParams {
    pub width: f64,
    pub height: f64,
    pub direction: GradientDirection,
    pub color1: Color,
    pub color2: Color,
}

impl Default for GradientParams {
    fn default() -> Self {
        Self {
            width: 256.0,
            height: 256.0,
            direction: GradientDirection::Horizontal,
            color1: Color::rgb(0x0e, 0xa5, 0xe9),
            color2: Color::rgb(0x8b, 0x5c, 0xf6),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerlinNoiseParams {
    pub width: f64,
    pub height: f64,
    /// Base frequency in noise cells per pixel
    pub scale: f64,
    pub octaves: f64,
    pub seed: u32,
    /// Exponent applied to the normalized value
    pub contrast: f64,
}

impl Default for PerlinNoiseParams {
    fn default() -> Self {
        Self {
            width: 256.0,
            height: 256.0,
            scale: 0.02,
            octaves: 4.0,
            seed: DEFAULT_SEED,
            contrast: 1.0,
        }
    }
}

impl PerlinNoiseParams {
    pub fn octave_count(&self) -> u32 {
        if self.octaves.is_finite() && self.octaves >= 1.0 {
            self.octaves.floor().min(32.0) as u32
        } else {
            1
        }
    }

    fn base_frequency(&self) -> f64 {
        self.scale.max(0.0001)
    }

    fn exponent(&self) -> f64 {
        self.contrast.max(0.01)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineParams {
    pub mode: BlendMode,
    pub alpha: f32,
}

impl Default for CombineParams {
    fn default() -> Self {
        Self {
            mode: BlendMode::Multiply,
            alpha: 1.0,
        }
    }
}

/// Properties specific to each node type
#[derive(Debug, Clone, PartialEq)]
pub enum NodeProperties {
    CreateImage(CreateImageParams),
    Gradient(GradientParams),
    PerlinNoise(PerlinNoiseParams),
    Combine(CombineParams),
    Display,
}

impl NodeProperties {
    pub fn for_type(node_type: NodeType) -> Self {
        match node_type {
            NodeType::CreateImage => Self::CreateImage(CreateImageParams::default()),
            NodeType::Gradient => Self::Gradient(GradientParams::default()),
            NodeType::PerlinNoise => Self::PerlinNoise(PerlinNoiseParams::default()),
            NodeType::Combine => Self::Combine(CombineParams::default()),
            NodeType::Display => Self::Display,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::CreateImage(_) => NodeType::CreateImage,
            Self::Gradient(_) => NodeType::Gradient,
            Self::PerlinNoise(_) => NodeType::PerlinNoise,
            Self::Combine(_) => NodeType::Combine,
            Self::Display => NodeType::Display,
        }
    }

    /// Parameters as a JSON object, the shape saved graphs use
    pub fn to_value(&self) -> serde_json::Value {
        let value = match self {
            Self::CreateImage(p) => serde_json::to_value(p),
            Self::Gradient(p) => serde_json::to_value(p),
            Self::PerlinNoise(p) => serde_json::to_value(p),
            Self::Combine(p) => serde_json::to_value(p),
            Self::Display => Ok(serde_json::Value::Object(Default::default())),
        };
        // Plain structs of numbers and strings always serialize
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Parse parameters for `node_type`. Missing fields take their defaults.
    pub fn from_value(node_type: NodeType, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            v => v,
        };
        Ok(match node_type {
            NodeType::CreateImage => Self::CreateImage(serde_json::from_value(value)?),
            NodeType::Gradient => Self::Gradient(serde_json::from_value(value)?),
            NodeType::PerlinNoise => Self::PerlinNoise(serde_json::from_value(value)?),
            NodeType::Combine => Self::Combine(serde_json::from_value(value)?),
            NodeType::Display => Self::Display,
        })
    }

    /// Run this node on its inputs.
    ///
    /// The pixel work runs on tokio's blocking pool, so a pass never stalls
    /// the runtime and a compute timeout can fire while a node is busy.
    pub async fn compute(&self, inputs: &PortMap, ctx: &ComputeContext) -> Result<PortMap, ComputeError> {
        let props = self.clone();
        let inputs = inputs.clone();
        let ctx = *ctx;
        tokio::task::spawn_blocking(move || props.render(&inputs, &ctx))
            .await
            .map_err(|e| ComputeError::Aborted(e.to_string()))?
    }

    /// Synchronous body of [`compute`](Self::compute)
    pub fn render(&self, inputs: &PortMap, ctx: &ComputeContext) -> Result<PortMap, ComputeError> {
        let image = match self {
            Self::CreateImage(p) => {
                let (w, h) = checked_dimensions(p.width, p.height, ctx.max_dimension)?;
                Some(ImageData::solid(w, h, p.color))
            }
            Self::Gradient(p) => Some(render_gradient(p, ctx)?),
            Self::PerlinNoise(p) => Some(render_noise(p, ctx)?),
            Self::Combine(p) => Some(match (inputs.get("A"), inputs.get("B")) {
                (Some(a), Some(b)) => blend::combine(a, b, p.mode, p.alpha),
                (Some(only), None) | (None, Some(only)) => only.clone(),
                (None, None) => ImageData::blank(ctx.default_width, ctx.default_height),
            }),
            // Pass-through; the preview sink presents the image
            Self::Display => inputs.get(IMAGE_PORT).cloned(),
        };

        let mut outputs = PortMap::new();
        if let Some(image) = image {
            outputs.insert(IMAGE_PORT.to_string(), image);
        }
        Ok(outputs)
    }
}

fn render_gradient(p: &GradientParams, ctx: &ComputeContext) -> Result<ImageData, ComputeError> {
    let (w, h) = checked_dimensions(p.width, p.height, ctx.max_dimension)?;
    let extent = match p.direction {
        GradientDirection::Horizontal => w,
        GradientDirection::Vertical => h,
    };

    // One color per column (or row), sampled at pixel centres
    let ramp: Vec<[u8; 4]> = (0..extent)
        .map(|i| {
            let t = (i as f32 + 0.5) / extent as f32;
            p.color1.lerp(p.color2, t).to_array()
        })
        .collect();

    Ok(ImageData::from_fn(w, h, |x, y| match p.direction {
        GradientDirection::Horizontal => ramp[x as usize],
        GradientDirection::Vertical => ramp[y as usize],
    }))
}

fn render_noise(p: &PerlinNoiseParams, ctx: &ComputeContext) -> Result<ImageData, ComputeError> {
    let (w, h) = checked_dimensions(p.width, p.height, ctx.max_dimension)?;
    let perlin = Perlin::new(p.seed);
    let octaves = p.octave_count();
    let base = p.base_frequency();
    let exponent = p.exponent();

    Ok(ImageData::from_fn(w, h, |x, y| {
        let (mut amp, mut freq, mut sum_amp, mut n) = (1.0, base, 0.0, 0.0);
        for _ in 0..octaves {
            n += perlin.noise2d(x as f64 * freq, y as f64 * freq) * amp;
            sum_amp += amp;
            amp *= 0.5;
            freq *= 2.0;
        }
        let v = (n / sum_amp).clamp(0.0, 1.0).powf(exponent);
        let c = (v * 255.0).round() as u8;
        [c, c, c, 255]
    }))
}
