// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for node inputs/outputs.

use crate::node::NodeId;
use crate::value::{PinType, PinValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a pin, allocated from the graph's identity counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinId(pub u32);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    /// Input pin
    Input,
    /// Output pin
    Output,
}

/// Declared shape of a pin in a node type
#[derive(Debug, Clone)]
pub struct PinSchema {
    /// Pin name
    pub name: String,
    /// Data type
    pub pin_type: PinType,
    /// Initial literal value
    pub default: PinValue,
    /// Match the producer's pixel format when an image is linked in
    pub auto_format: bool,
    /// Option names for enum pins
    pub options: Vec<String>,
}

impl PinSchema {
    /// Create a pin schema holding the type's zero value
    pub fn new(name: impl Into<String>, pin_type: PinType) -> Self {
        Self {
            name: name.into(),
            pin_type,
            default: PinValue::default_for(pin_type),
            auto_format: false,
            options: Vec::new(),
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: PinValue) -> Self {
        debug_assert_eq!(value.pin_type(), self.pin_type);
        self.default = value;
        self
    }

    /// Mark the input as format-following
    pub fn auto_format(mut self) -> Self {
        self.auto_format = true;
        self
    }

    /// Name the options of an enum pin
    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| (*o).to_string()).collect();
        self
    }
}

/// A pin on a node
#[derive(Debug, Clone)]
pub struct Pin {
    /// Pin ID
    pub id: PinId,
    /// Owning node
    pub node: NodeId,
    /// Pin name
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Data type
    pub pin_type: PinType,
    /// Current value; for outputs this is the cached result
    pub value: PinValue,
    /// Value set by defaults or widget edits, restored on disconnect
    pub literal: PinValue,
    /// Whether the input follows the producer's pixel format
    pub auto_format: bool,
    /// Option names for enum pins
    pub options: Vec<String>,
    /// Pins at the other end of this pin's links
    pub connected: Vec<PinId>,
}

impl Pin {
    /// Create a pin from its schema
    pub fn from_schema(id: PinId, node: NodeId, schema: &PinSchema, direction: PinDirection) -> Self {
        Self {
            id,
            node,
            name: schema.name.clone(),
            direction,
            pin_type: schema.pin_type,
            value: schema.default.clone(),
            literal: schema.default.clone(),
            auto_format: schema.auto_format && direction == PinDirection::Input,
            options: schema.options.clone(),
            connected: Vec::new(),
        }
    }

    /// Whether any link touches this pin
    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    /// Drop `other` from the connection set
    pub(crate) fn forget(&mut self, other: PinId) {
        self.connected.retain(|p| *p != other);
    }

    /// Put the literal back after the input lost its link
    pub(crate) fn restore_literal(&mut self) {
        self.value = self.literal.clone();
    }
}

/// Where a pin lives: its node, direction and slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinAddress {
    /// Owning node
    pub node: NodeId,
    /// Pin direction
    pub direction: PinDirection,
    /// Index among the node's pins of that direction
    pub slot: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_never_follow_format() {
        let schema = PinSchema::new("Image", PinType::Texture).auto_format();
        let node = NodeId::new();
        let input = Pin::from_schema(PinId(1), node, &schema, PinDirection::Input);
        let output = Pin::from_schema(PinId(2), node, &schema, PinDirection::Output);
        assert!(input.auto_format);
        assert!(!output.auto_format);
    }

    #[test]
    fn restore_literal_after_link() {
        let schema = PinSchema::new("Scale", PinType::Float).with_default(PinValue::Float(4.0));
        let mut pin = Pin::from_schema(PinId(1), NodeId::new(), &schema, PinDirection::Input);
        pin.value = PinValue::Float(9.0);
        pin.connected.push(PinId(5));
        pin.forget(PinId(5));
        pin.restore_literal();
        assert!(!pin.is_connected());
        assert_eq!(pin.value, PinValue::Float(4.0));
    }
}
