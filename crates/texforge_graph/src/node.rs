// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph.

use crate::catalog::{ImageKernel, ShaderKernel, ValueOp};
use crate::device::{ImageFormat, ImageResources, ShaderResources};
use crate::pin::{Pin, PinSchema};
use crate::sync::{CompletionToken, WaitEntry};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable handle for a node.
///
/// Handles survive removal of other nodes; the node's index in the graph is
/// derived from its position and shifts instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Constants and parameters
    Input,
    /// Scalar and color math
    Math,
    /// Procedural image generators
    Generator,
    /// Image filters
    Filter,
    /// Material outputs
    Output,
}

/// What a node type computes with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Pure CPU function
    Value(ValueOp),
    /// Device image kernel with one texture output
    Image(ImageKernel),
    /// Device parameter collector feeding a renderer
    Shader(ShaderKernel),
}

/// Node type definition
#[derive(Debug, Clone)]
pub struct NodeType {
    /// Unique type identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Computation kind
    pub kind: NodeKind,
    /// Input pins
    pub inputs: Vec<PinSchema>,
    /// Output pins
    pub outputs: Vec<PinSchema>,
}

/// State of an image node
#[derive(Debug, Clone)]
pub struct ImageNode {
    /// Kernel the node runs
    pub kernel: ImageKernel,
    /// Device resources
    pub resources: ImageResources,
    /// Counter values of the latest execution
    pub token: CompletionToken,
    /// Upstream waits collected for the next execution
    pub waits: Vec<WaitEntry>,
}

impl ImageNode {
    /// Wrap freshly allocated resources
    pub fn new(kernel: ImageKernel, resources: ImageResources) -> Self {
        Self {
            kernel,
            resources,
            token: CompletionToken::default(),
            waits: Vec::new(),
        }
    }

    /// Current output format
    pub fn format(&self) -> ImageFormat {
        self.resources.format
    }
}

/// State of a shader node
#[derive(Debug, Clone)]
pub struct ShaderNode {
    /// Kernel the node feeds
    pub kernel: ShaderKernel,
    /// Device resources
    pub resources: ShaderResources,
}

/// Per-kind payload of a node instance
#[derive(Debug, Clone)]
pub enum NodePayload {
    /// CPU value node
    Value(ValueOp),
    /// Device image node
    Image(ImageNode),
    /// Device shader node
    Shader(ShaderNode),
}

impl NodePayload {
    /// Whether the node owns device resources
    pub fn is_device(&self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable handle
    pub id: NodeId,
    /// Index of the node type in the catalog
    pub type_tag: usize,
    /// Display name (can be customized)
    pub label: String,
    /// Position in the graph UI
    pub position: [f32; 2],
    /// Input pins
    pub inputs: Vec<Pin>,
    /// Output pins
    pub outputs: Vec<Pin>,
    /// Kind-specific state
    pub payload: NodePayload,
}

impl Node {
    /// Get an input pin by slot
    pub fn input(&self, slot: usize) -> Option<&Pin> {
        self.inputs.get(slot)
    }

    /// Get an output pin by slot
    pub fn output(&self, slot: usize) -> Option<&Pin> {
        self.outputs.get(slot)
    }

    /// Get all pins
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Image state, if this is an image node
    pub fn as_image(&self) -> Option<&ImageNode> {
        match &self.payload {
            NodePayload::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Mutable image state, if this is an image node
    pub fn as_image_mut(&mut self) -> Option<&mut ImageNode> {
        match &mut self.payload {
            NodePayload::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Pack the current input values into a uniform block
    pub fn uniform_lanes(&self) -> Vec<f32> {
        let mut lanes = Vec::new();
        for pin in &self.inputs {
            pin.value.pack_into(&mut lanes);
        }
        lanes
    }
}

/// Registry of available node types.
///
/// Types keep their registration order; a type's position is its tag.
pub struct NodeRegistry {
    /// Registered node types by ID
    types: indexmap::IndexMap<String, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: indexmap::IndexMap::new(),
        }
    }

    /// Register a node type
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id.clone(), node_type);
    }

    /// Get a node type by ID
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.types.get(id)
    }

    /// Get a node type by tag
    pub fn get_by_tag(&self, tag: usize) -> Option<&NodeType> {
        self.types.get_index(tag).map(|(_, t)| t)
    }

    /// Tag of a node type ID
    pub fn tag_of(&self, id: &str) -> Option<usize> {
        self.types.get_index_of(id)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
