// SPDX-License-Identifier: MIT OR Apache-2.0
//! The closed set of node types.
//!
//! Value nodes evaluate on the CPU, image nodes render a texture on the
//! device, and the material node collects parameters for the renderer. A
//! type's tag is its registration position, which session files rely on, so
//! new types go at the end.

use crate::device::ImageFormat;
use crate::node::{NodeCategory, NodeKind, NodeRegistry, NodeType};
use crate::pin::PinSchema;
use crate::value::{Gradient, PinType, PinValue};

/// Operations of the math node, in enum-pin order
pub const MATH_OPERATIONS: [&str; 7] = [
    "Add", "Subtract", "Multiply", "Divide", "Minimum", "Maximum", "Power",
];

/// Modes of the blend node, in enum-pin order
pub const BLEND_MODES: [&str; 4] = ["Mix", "Add", "Multiply", "Screen"];

/// CPU functions of value nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOp {
    /// Pass a float through
    Float,
    /// Pass an integer through
    Integer,
    /// Pass a boolean through
    Boolean,
    /// Pass a color through
    Color,
    /// Binary float arithmetic selected by an enum input
    Math,
    /// Pick one of two floats
    Select,
    /// Linear blend of two colors
    MixColor,
}

impl ValueOp {
    /// Evaluate over input values in slot order.
    ///
    /// Missing or mistyped inputs fall back to neutral values so a
    /// half-edited graph still produces an output.
    pub fn evaluate(&self, inputs: &[PinValue]) -> PinValue {
        let float = |i: usize| inputs.get(i).and_then(PinValue::as_float).unwrap_or(0.0);
        let color = |i: usize| {
            inputs
                .get(i)
                .and_then(PinValue::as_color)
                .unwrap_or([0.0, 0.0, 0.0, 1.0])
        };

        match self {
            Self::Float => PinValue::Float(float(0)),
            Self::Integer => match inputs.first() {
                Some(PinValue::Int(v)) => PinValue::Int(*v),
                _ => PinValue::Int(0),
            },
            Self::Boolean => PinValue::Bool(inputs.first().and_then(PinValue::as_bool).unwrap_or(false)),
            Self::Color => PinValue::Color(color(0)),
            Self::Math => {
                let op = inputs.get(2).and_then(PinValue::as_enum).unwrap_or(0);
                PinValue::Float(math(op, float(0), float(1)))
            }
            Self::Select => {
                let condition = inputs.first().and_then(PinValue::as_bool).unwrap_or(false);
                PinValue::Float(if condition { float(1) } else { float(2) })
            }
            Self::MixColor => {
                let (a, b) = (color(0), color(1));
                let t = float(2).clamp(0.0, 1.0);
                let mut out = [0.0; 4];
                for (i, c) in out.iter_mut().enumerate() {
                    *c = a[i] + (b[i] - a[i]) * t;
                }
                PinValue::Color(out)
            }
        }
    }
}

fn math(op: u32, a: f32, b: f32) -> f32 {
    match op {
        0 => a + b,
        1 => a - b,
        2 => a * b,
        // Division by zero yields zero rather than infinity
        3 => {
            if b == 0.0 {
                0.0
            } else {
                a / b
            }
        }
        4 => a.min(b),
        5 => a.max(b),
        6 => a.powf(b),
        _ => a,
    }
}

/// Device kernels of image nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKernel {
    /// Fractal Perlin noise
    PerlinNoise,
    /// Cellular noise
    Voronoi,
    /// Two-color checkerboard
    Checker,
    /// Map intensities through a gradient
    GradientMap,
    /// Brightness and contrast adjustment
    BrightnessContrast,
    /// Combine two images
    Blend,
    /// Box blur
    Blur,
}

impl ImageKernel {
    /// Name of the compute shader
    pub fn shader_name(&self) -> &'static str {
        match self {
            Self::PerlinNoise => "perlin_noise",
            Self::Voronoi => "voronoi",
            Self::Checker => "checker",
            Self::GradientMap => "gradient_map",
            Self::BrightnessContrast => "brightness_contrast",
            Self::Blend => "blend",
            Self::Blur => "blur",
        }
    }

    /// Format the kernel renders to, if it is fixed
    pub fn native_format(&self) -> Option<ImageFormat> {
        match self {
            Self::PerlinNoise | Self::Voronoi => Some(ImageFormat::R16Float),
            _ => None,
        }
    }
}

/// Device kernels of shader nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKernel {
    /// Metallic-roughness material parameters
    PbrMaterial,
}

impl ShaderKernel {
    /// Name of the material shader
    pub fn shader_name(&self) -> &'static str {
        match self {
            Self::PbrMaterial => "pbr_material",
        }
    }
}

/// Create the node registry with every available node type
pub fn standard_catalog() -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    // ========================================================================
    // Value Nodes
    // ========================================================================

    registry.register(NodeType {
        id: "float".to_string(),
        name: "Float".to_string(),
        category: NodeCategory::Input,
        description: "Constant float value".to_string(),
        kind: NodeKind::Value(ValueOp::Float),
        inputs: vec![PinSchema::new("Value", PinType::Float).with_default(PinValue::Float(1.0))],
        outputs: vec![PinSchema::new("Value", PinType::Float)],
    });

    registry.register(NodeType {
        id: "integer".to_string(),
        name: "Integer".to_string(),
        category: NodeCategory::Input,
        description: "Constant integer value".to_string(),
        kind: NodeKind::Value(ValueOp::Integer),
        inputs: vec![PinSchema::new("Value", PinType::Int).with_default(PinValue::Int(1))],
        outputs: vec![PinSchema::new("Value", PinType::Int)],
    });

    registry.register(NodeType {
        id: "boolean".to_string(),
        name: "Boolean".to_string(),
        category: NodeCategory::Input,
        description: "Constant boolean value".to_string(),
        kind: NodeKind::Value(ValueOp::Boolean),
        inputs: vec![PinSchema::new("Value", PinType::Bool)],
        outputs: vec![PinSchema::new("Value", PinType::Bool)],
    });

    registry.register(NodeType {
        id: "color".to_string(),
        name: "Color".to_string(),
        category: NodeCategory::Input,
        description: "Constant color value".to_string(),
        kind: NodeKind::Value(ValueOp::Color),
        inputs: vec![
            PinSchema::new("Color", PinType::Color).with_default(PinValue::Color([1.0, 1.0, 1.0, 1.0])),
        ],
        outputs: vec![PinSchema::new("Color", PinType::Color)],
    });

    registry.register(NodeType {
        id: "math".to_string(),
        name: "Math".to_string(),
        category: NodeCategory::Math,
        description: "Binary float operation".to_string(),
        kind: NodeKind::Value(ValueOp::Math),
        inputs: vec![
            PinSchema::new("A", PinType::Float),
            PinSchema::new("B", PinType::Float),
            PinSchema::new("Operation", PinType::Enum).with_options(&MATH_OPERATIONS),
        ],
        outputs: vec![PinSchema::new("Result", PinType::Float)],
    });

    registry.register(NodeType {
        id: "select".to_string(),
        name: "Select".to_string(),
        category: NodeCategory::Math,
        description: "Choose A when the condition holds, B otherwise".to_string(),
        kind: NodeKind::Value(ValueOp::Select),
        inputs: vec![
            PinSchema::new("Condition", PinType::Bool),
            PinSchema::new("A", PinType::Float),
            PinSchema::new("B", PinType::Float),
        ],
        outputs: vec![PinSchema::new("Result", PinType::Float)],
    });

    registry.register(NodeType {
        id: "mix_color".to_string(),
        name: "Mix Color".to_string(),
        category: NodeCategory::Math,
        description: "Linear blend between two colors".to_string(),
        kind: NodeKind::Value(ValueOp::MixColor),
        inputs: vec![
            PinSchema::new("A", PinType::Color),
            PinSchema::new("B", PinType::Color).with_default(PinValue::Color([1.0, 1.0, 1.0, 1.0])),
            PinSchema::new("Factor", PinType::Float).with_default(PinValue::Float(0.5)),
        ],
        outputs: vec![PinSchema::new("Color", PinType::Color)],
    });

    // ========================================================================
    // Generators
    // ========================================================================

    registry.register(NodeType {
        id: "perlin_noise".to_string(),
        name: "Perlin Noise".to_string(),
        category: NodeCategory::Generator,
        description: "Fractal gradient noise".to_string(),
        kind: NodeKind::Image(ImageKernel::PerlinNoise),
        inputs: vec![
            PinSchema::new("Scale", PinType::Float).with_default(PinValue::Float(4.0)),
            PinSchema::new("Octaves", PinType::Int).with_default(PinValue::Int(4)),
            PinSchema::new("Seed", PinType::Int),
        ],
        outputs: vec![PinSchema::new("Image", PinType::Texture)],
    });

    registry.register(NodeType {
        id: "voronoi".to_string(),
        name: "Voronoi".to_string(),
        category: NodeCategory::Generator,
        description: "Cellular noise".to_string(),
        kind: NodeKind::Image(ImageKernel::Voronoi),
        inputs: vec![
            PinSchema::new("Scale", PinType::Float).with_default(PinValue::Float(8.0)),
            PinSchema::new("Jitter", PinType::Float).with_default(PinValue::Float(1.0)),
            PinSchema::new("Seed", PinType::Int),
        ],
        outputs: vec![PinSchema::new("Image", PinType::Texture)],
    });

    registry.register(NodeType {
        id: "checker".to_string(),
        name: "Checker".to_string(),
        category: NodeCategory::Generator,
        description: "Two-color checkerboard".to_string(),
        kind: NodeKind::Image(ImageKernel::Checker),
        inputs: vec![
            PinSchema::new("Tiles", PinType::Int).with_default(PinValue::Int(8)),
            PinSchema::new("Color A", PinType::ColorOrTexture).with_default(PinValue::ColorOrTexture {
                color: [1.0, 1.0, 1.0, 1.0],
                texture: None,
            }),
            PinSchema::new("Color B", PinType::ColorOrTexture),
        ],
        outputs: vec![PinSchema::new("Image", PinType::Texture)],
    });

    // ========================================================================
    // Filters
    // ========================================================================

    registry.register(NodeType {
        id: "gradient_map".to_string(),
        name: "Gradient Map".to_string(),
        category: NodeCategory::Filter,
        description: "Map intensities through a color ramp".to_string(),
        kind: NodeKind::Image(ImageKernel::GradientMap),
        inputs: vec![
            PinSchema::new("Input", PinType::FloatOrTexture).with_default(PinValue::FloatOrTexture {
                value: 0.5,
                texture: None,
            }),
            PinSchema::new("Gradient", PinType::Gradient)
                .with_default(PinValue::Gradient(Gradient::black_to_white())),
        ],
        outputs: vec![PinSchema::new("Image", PinType::Texture)],
    });

    registry.register(NodeType {
        id: "brightness_contrast".to_string(),
        name: "Brightness/Contrast".to_string(),
        category: NodeCategory::Filter,
        description: "Adjust brightness and contrast".to_string(),
        kind: NodeKind::Image(ImageKernel::BrightnessContrast),
        inputs: vec![
            PinSchema::new("Image", PinType::Texture).auto_format(),
            PinSchema::new("Brightness", PinType::FloatOrTexture),
            PinSchema::new("Contrast", PinType::Float).with_default(PinValue::Float(1.0)),
        ],
        outputs: vec![PinSchema::new("Image", PinType::Texture)],
    });

    registry.register(NodeType {
        id: "blend".to_string(),
        name: "Blend".to_string(),
        category: NodeCategory::Filter,
        description: "Combine two images".to_string(),
        kind: NodeKind::Image(ImageKernel::Blend),
        inputs: vec![
            PinSchema::new("Base", PinType::Texture).auto_format(),
            PinSchema::new("Layer", PinType::Texture),
            PinSchema::new("Mode", PinType::Enum).with_options(&BLEND_MODES),
            PinSchema::new("Opacity", PinType::FloatOrTexture).with_default(PinValue::FloatOrTexture {
                value: 1.0,
                texture: None,
            }),
        ],
        outputs: vec![PinSchema::new("Image", PinType::Texture)],
    });

    registry.register(NodeType {
        id: "blur".to_string(),
        name: "Blur".to_string(),
        category: NodeCategory::Filter,
        description: "Box blur".to_string(),
        kind: NodeKind::Image(ImageKernel::Blur),
        inputs: vec![
            PinSchema::new("Image", PinType::Texture).auto_format(),
            PinSchema::new("Radius", PinType::Float).with_default(PinValue::Float(2.0)),
        ],
        outputs: vec![PinSchema::new("Image", PinType::Texture)],
    });

    // ========================================================================
    // Material Output
    // ========================================================================

    registry.register(NodeType {
        id: "pbr_material".to_string(),
        name: "PBR Material".to_string(),
        category: NodeCategory::Output,
        description: "Metallic-roughness material parameters".to_string(),
        kind: NodeKind::Shader(ShaderKernel::PbrMaterial),
        inputs: vec![
            PinSchema::new("Base Color", PinType::ColorOrTexture).with_default(PinValue::ColorOrTexture {
                color: [0.8, 0.8, 0.8, 1.0],
                texture: None,
            }),
            PinSchema::new("Metallic", PinType::FloatOrTexture),
            PinSchema::new("Roughness", PinType::FloatOrTexture).with_default(PinValue::FloatOrTexture {
                value: 0.5,
                texture: None,
            }),
            PinSchema::new("Normal", PinType::Texture),
            PinSchema::new("Height", PinType::FloatOrTexture),
        ],
        outputs: vec![],
    });

    registry
}
