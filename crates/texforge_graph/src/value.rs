// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values that flow along links, and the type rules that govern them.

use crate::device::TextureHandle;
use serde::{Deserialize, Serialize};

/// Data type carried by a pin.
///
/// The set is closed: node schemas can only declare these types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinType {
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// Boolean value
    Bool,
    /// Index into a fixed list of named options
    Enum,
    /// RGBA color (vector4)
    Color,
    /// Reference to a device texture
    Texture,
    /// Float that a texture may override
    FloatOrTexture,
    /// Color that a texture may override
    ColorOrTexture,
    /// Color ramp backed by a device texture
    Gradient,
}

impl PinType {
    /// Get the color for this pin type (for UI)
    pub fn color(&self) -> [u8; 3] {
        match self {
            Self::Int => [80, 200, 200],
            Self::Float => [80, 200, 80],
            Self::Bool => [200, 80, 80],
            Self::Enum => [200, 180, 150],
            Self::Color => [255, 200, 100],
            Self::Texture => [100, 150, 200],
            Self::FloatOrTexture => [90, 175, 140],
            Self::ColorOrTexture => [180, 175, 150],
            Self::Gradient => [200, 100, 200],
        }
    }

    /// Check if an output of this type may feed an input of `other`.
    ///
    /// Identical types always connect. The only widenings are a plain float
    /// or color into its texture-overridable counterpart, and a texture into
    /// either overridable slot. The check is direction-sensitive.
    pub fn can_connect_to(&self, other: &PinType) -> bool {
        if self == other {
            return true;
        }

        matches!(
            (self, other),
            (Self::Float, Self::FloatOrTexture)
                | (Self::Color, Self::ColorOrTexture)
                | (Self::Texture, Self::FloatOrTexture | Self::ColorOrTexture)
        )
    }

    /// Whether values of this type reserve a texture binding slot.
    pub fn has_texture_slot(&self) -> bool {
        matches!(
            self,
            Self::Texture | Self::FloatOrTexture | Self::ColorOrTexture | Self::Gradient
        )
    }
}

/// A single stop of a gradient ramp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Position along the ramp in `[0, 1]`
    pub position: f32,
    /// Color at this position
    pub color: [f32; 4],
}

impl GradientStop {
    /// Create a new stop
    pub fn new(position: f32, color: [f32; 4]) -> Self {
        Self { position, color }
    }
}

/// Gradient value: stops plus the texture the ramp was uploaded to.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    stops: Vec<GradientStop>,
    /// Device ramp texture, `None` until uploaded
    pub ramp: Option<TextureHandle>,
}

impl Gradient {
    /// Create a gradient from stops, sorted by position
    pub fn new(mut stops: Vec<GradientStop>) -> Self {
        stops.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { stops, ramp: None }
    }

    /// Black to white ramp
    pub fn black_to_white() -> Self {
        Self::new(vec![
            GradientStop::new(0.0, [0.0, 0.0, 0.0, 1.0]),
            GradientStop::new(1.0, [1.0, 1.0, 1.0, 1.0]),
        ])
    }

    /// Stops ordered by position
    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    /// Sample the ramp at `t` with linear interpolation between stops.
    pub fn sample(&self, t: f32) -> [f32; 4] {
        let (first, last) = match (self.stops.first(), self.stops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return [0.0, 0.0, 0.0, 1.0],
        };
        if t <= first.position {
            return first.color;
        }
        if t >= last.position {
            return last.color;
        }

        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t >= a.position && t <= b.position {
                let span = b.position - a.position;
                let f = if span > 0.0 { (t - a.position) / span } else { 0.0 };
                let mut color = [0.0; 4];
                for (i, c) in color.iter_mut().enumerate() {
                    *c = a.color[i] + (b.color[i] - a.color[i]) * f;
                }
                return color;
            }
        }
        last.color
    }
}

/// Value stored in a pin
#[derive(Debug, Clone, PartialEq)]
pub enum PinValue {
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// Boolean
    Bool(bool),
    /// Selected option index
    Enum(u32),
    /// RGBA color
    Color([f32; 4]),
    /// Texture reference; `None` is the disconnected sentinel
    Texture(Option<TextureHandle>),
    /// Scalar with an optional texture override
    FloatOrTexture {
        /// Scalar used when no texture is bound
        value: f32,
        /// Overriding texture
        texture: Option<TextureHandle>,
    },
    /// Color with an optional texture override
    ColorOrTexture {
        /// Color used when no texture is bound
        color: [f32; 4],
        /// Overriding texture
        texture: Option<TextureHandle>,
    },
    /// Gradient ramp
    Gradient(Gradient),
}

impl PinValue {
    /// Get the pin type for this value
    pub fn pin_type(&self) -> PinType {
        match self {
            Self::Int(_) => PinType::Int,
            Self::Float(_) => PinType::Float,
            Self::Bool(_) => PinType::Bool,
            Self::Enum(_) => PinType::Enum,
            Self::Color(_) => PinType::Color,
            Self::Texture(_) => PinType::Texture,
            Self::FloatOrTexture { .. } => PinType::FloatOrTexture,
            Self::ColorOrTexture { .. } => PinType::ColorOrTexture,
            Self::Gradient(_) => PinType::Gradient,
        }
    }

    /// Zero value of a type
    pub fn default_for(pin_type: PinType) -> Self {
        match pin_type {
            PinType::Int => Self::Int(0),
            PinType::Float => Self::Float(0.0),
            PinType::Bool => Self::Bool(false),
            PinType::Enum => Self::Enum(0),
            PinType::Color => Self::Color([0.0, 0.0, 0.0, 1.0]),
            PinType::Texture => Self::Texture(None),
            PinType::FloatOrTexture => Self::FloatOrTexture { value: 0.0, texture: None },
            PinType::ColorOrTexture => Self::ColorOrTexture {
                color: [0.0, 0.0, 0.0, 1.0],
                texture: None,
            },
            PinType::Gradient => Self::Gradient(Gradient::black_to_white()),
        }
    }

    /// Reinterpret a producer value for a consumer currently holding `self`.
    ///
    /// Returns `None` when the pair is not connectable. Texture widenings keep
    /// the consumer's scalar or color slot; scalar widenings leave the texture
    /// slot disconnected.
    pub fn widen_into(&self, consumer: &PinValue) -> Option<PinValue> {
        if self.pin_type() == consumer.pin_type() {
            return Some(self.clone());
        }

        match (self, consumer) {
            (Self::Float(value), Self::FloatOrTexture { .. }) => Some(Self::FloatOrTexture {
                value: *value,
                texture: None,
            }),
            (Self::Color(color), Self::ColorOrTexture { .. }) => Some(Self::ColorOrTexture {
                color: *color,
                texture: None,
            }),
            (Self::Texture(texture), Self::FloatOrTexture { value, .. }) => {
                Some(Self::FloatOrTexture {
                    value: *value,
                    texture: *texture,
                })
            }
            (Self::Texture(texture), Self::ColorOrTexture { color, .. }) => {
                Some(Self::ColorOrTexture {
                    color: *color,
                    texture: *texture,
                })
            }
            _ => None,
        }
    }

    /// Texture currently bound in this value's texture slot
    pub fn texture(&self) -> Option<TextureHandle> {
        match self {
            Self::Texture(texture)
            | Self::FloatOrTexture { texture, .. }
            | Self::ColorOrTexture { texture, .. } => *texture,
            Self::Gradient(gradient) => gradient.ramp,
            _ => None,
        }
    }

    /// Read as a float, widening integers and booleans
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) | Self::FloatOrTexture { value: v, .. } => Some(*v),
            Self::Int(v) => Some(*v as f32),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Enum(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Read as a color
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Self::Color(c) | Self::ColorOrTexture { color: c, .. } => Some(*c),
            _ => None,
        }
    }

    /// Read as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as an enum index
    pub fn as_enum(&self) -> Option<u32> {
        match self {
            Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    /// Append this value's uniform lanes to `out`.
    pub fn pack_into(&self, out: &mut Vec<f32>) {
        fn bound(texture: &Option<TextureHandle>) -> f32 {
            if texture.is_some() {
                1.0
            } else {
                0.0
            }
        }

        match self {
            Self::Int(v) => out.push(*v as f32),
            Self::Float(v) => out.push(*v),
            Self::Bool(v) => out.push(if *v { 1.0 } else { 0.0 }),
            Self::Enum(v) => out.push(*v as f32),
            Self::Color(c) => out.extend_from_slice(c),
            Self::Texture(t) => out.push(bound(t)),
            Self::FloatOrTexture { value, texture } => {
                out.push(*value);
                out.push(bound(texture));
            }
            Self::ColorOrTexture { color, texture } => {
                out.extend_from_slice(color);
                out.push(bound(texture));
            }
            Self::Gradient(g) => out.push(g.stops().len() as f32),
        }
    }
}
