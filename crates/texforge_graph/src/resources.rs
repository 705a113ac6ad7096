// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-node-type device resources and per-node resource upkeep.
//!
//! Pipelines are built once per kernel when the registry is created and
//! borrowed by every node of that kind. The helpers below keep a device
//! node's uniforms and texture bindings in step with its input pins.

use crate::device::{
    Device, ImageFormat, ImageNodeDesc, PipelineHandle, ShaderNodeDesc,
};
use crate::error::DeviceResult;
use crate::graph::Graph;
use crate::node::{ImageNode, Node, NodeKind, NodePayload, NodeRegistry, NodeType, ShaderNode};
use crate::pin::PinId;
use crate::value::PinValue;
use std::collections::HashMap;

/// Shared resources of one kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelResources {
    /// Compiled pipeline
    pub pipeline: PipelineHandle,
    /// Format new nodes of this kernel render to
    pub format: ImageFormat,
}

/// Pipelines for every device kernel in a catalog
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    kernels: HashMap<&'static str, KernelResources>,
    output_size: u32,
}

impl ResourceRegistry {
    /// Build pipelines for all device node types
    pub fn new(
        device: &mut dyn Device,
        catalog: &NodeRegistry,
        default_format: ImageFormat,
        output_size: u32,
    ) -> DeviceResult<Self> {
        let mut kernels = HashMap::new();
        for node_type in catalog.types() {
            let (name, format) = match node_type.kind {
                NodeKind::Value(_) => continue,
                NodeKind::Image(kernel) => (
                    kernel.shader_name(),
                    kernel.native_format().unwrap_or(default_format),
                ),
                NodeKind::Shader(kernel) => (kernel.shader_name(), default_format),
            };
            if kernels.contains_key(name) {
                continue;
            }
            let pipeline = device.create_pipeline(name, format)?;
            kernels.insert(name, KernelResources { pipeline, format });
        }

        tracing::debug!(kernels = kernels.len(), "Built kernel pipelines");
        Ok(Self {
            kernels,
            output_size,
        })
    }

    /// Resources of a kernel by shader name
    pub fn kernel(&self, name: &str) -> Option<&KernelResources> {
        self.kernels.get(name)
    }

    /// Side length of image node outputs
    pub fn output_size(&self) -> u32 {
        self.output_size
    }

    /// Create the payload for a new node of `node_type`
    pub fn instantiate(&self, device: &mut dyn Device, node_type: &NodeType) -> DeviceResult<NodePayload> {
        let mut lanes = Vec::new();
        for schema in &node_type.inputs {
            schema.default.pack_into(&mut lanes);
        }

        match node_type.kind {
            NodeKind::Value(op) => Ok(NodePayload::Value(op)),
            NodeKind::Image(kernel) => {
                let shared = self.lookup(kernel.shader_name())?;
                let resources = device.create_image_node(&ImageNodeDesc {
                    label: &node_type.name,
                    pipeline: shared.pipeline,
                    size: self.output_size,
                    format: shared.format,
                    input_slots: node_type.inputs.len(),
                    uniform_lanes: lanes.len(),
                })?;
                Ok(NodePayload::Image(ImageNode::new(kernel, resources)))
            }
            NodeKind::Shader(kernel) => {
                let shared = self.lookup(kernel.shader_name())?;
                let resources = device.create_shader_node(&ShaderNodeDesc {
                    label: &node_type.name,
                    pipeline: shared.pipeline,
                    input_slots: node_type.inputs.len(),
                    uniform_lanes: lanes.len(),
                })?;
                Ok(NodePayload::Shader(ShaderNode { kernel, resources }))
            }
        }
    }

    fn lookup(&self, name: &str) -> DeviceResult<KernelResources> {
        self.kernels
            .get(name)
            .copied()
            .ok_or_else(|| crate::error::DeviceError::AllocationFailed(format!("no pipeline for {name}")))
    }
}

/// Packed `f32` uniform block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformBlock(pub Vec<f32>);

impl UniformBlock {
    /// Pack a node's current input values
    pub fn from_node(node: &Node) -> Self {
        Self(node.uniform_lanes())
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.0)
    }
}

/// Write a device node's uniforms
fn write_uniforms(device: &mut dyn Device, node: &Node) -> DeviceResult<()> {
    let buffer = match &node.payload {
        NodePayload::Value(_) => return Ok(()),
        NodePayload::Image(image) => image.resources.uniforms,
        NodePayload::Shader(shader) => shader.resources.uniforms,
    };
    device.write_uniforms(buffer, UniformBlock::from_node(node).as_bytes())
}

/// Update a device node's binding for one input slot
fn bind_slot(device: &mut dyn Device, node: &Node, slot: usize) -> DeviceResult<()> {
    let Some(pin) = node.inputs.get(slot) else {
        return Ok(());
    };
    if !pin.pin_type.has_texture_slot() {
        return Ok(());
    }
    let descriptor = match &node.payload {
        NodePayload::Value(_) => return Ok(()),
        NodePayload::Image(image) => image.resources.descriptor,
        NodePayload::Shader(shader) => shader.resources.descriptor,
    };
    device.bind_texture(descriptor, slot, pin.value.texture())
}

/// Bring a device node's state for one input pin up to date.
///
/// Value nodes have nothing on the device and are skipped.
pub fn apply_input(graph: &Graph, device: &mut dyn Device, pin: PinId) -> DeviceResult<()> {
    let Some(address) = graph.pin_address(pin) else {
        return Ok(());
    };
    let Some(node) = graph.node(address.node) else {
        return Ok(());
    };
    if !node.payload.is_device() {
        return Ok(());
    }
    bind_slot(device, node, address.slot)?;
    write_uniforms(device, node)
}

/// Write every uniform and binding of a device node
pub fn sync_node(device: &mut dyn Device, node: &Node) -> DeviceResult<()> {
    if !node.payload.is_device() {
        return Ok(());
    }
    for slot in 0..node.inputs.len() {
        bind_slot(device, node, slot)?;
    }
    write_uniforms(device, node)
}

/// Expose an image node's output texture on its output pin
pub fn publish_output(node: &mut Node) {
    let Some(texture) = node.as_image().map(|i| i.resources.output) else {
        return;
    };
    if let Some(pin) = node.outputs.first_mut() {
        pin.value = PinValue::Texture(Some(texture));
        pin.literal = pin.value.clone();
    }
}

/// Upload the gradient of every gradient input whose ramp is missing or stale
pub fn upload_gradients(device: &mut dyn Device, node: &mut Node) -> DeviceResult<()> {
    for pin in node.inputs.iter_mut() {
        let PinValue::Gradient(gradient) = &mut pin.literal else {
            continue;
        };
        let ramp = device.upload_gradient(gradient.stops(), gradient.ramp)?;
        gradient.ramp = Some(ramp);
        if let PinValue::Gradient(live) = &mut pin.value {
            *live = gradient.clone();
        }
    }
    Ok(())
}

/// Free a node's device resources
pub fn release(device: &mut dyn Device, node: &Node) {
    match &node.payload {
        NodePayload::Value(_) => {}
        NodePayload::Image(image) => device.release_image_node(&image.resources),
        NodePayload::Shader(shader) => device.release_shader_node(&shader.resources),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard_catalog;
    use crate::headless::HeadlessDevice;

    #[test]
    fn one_pipeline_per_kernel() {
        let mut device = HeadlessDevice::new();
        let catalog = standard_catalog();
        let registry = ResourceRegistry::new(&mut device, &catalog, ImageFormat::Rgba8Unorm, 256).unwrap();
        assert!(registry.kernel("perlin_noise").is_some());
        assert!(registry.kernel("pbr_material").is_some());
        assert!(registry.kernel("float").is_none());
        assert_eq!(registry.kernel("perlin_noise").unwrap().format, ImageFormat::R16Float);
        assert_eq!(registry.kernel("blur").unwrap().format, ImageFormat::Rgba8Unorm);
    }

    #[test]
    fn instantiate_matches_kind() {
        let mut device = HeadlessDevice::new();
        let catalog = standard_catalog();
        let registry = ResourceRegistry::new(&mut device, &catalog, ImageFormat::Rgba8Unorm, 256).unwrap();

        let value = registry.instantiate(&mut device, catalog.get("math").unwrap()).unwrap();
        assert!(!value.is_device());

        let image = registry.instantiate(&mut device, catalog.get("blur").unwrap()).unwrap();
        match image {
            NodePayload::Image(image) => {
                assert_eq!(image.resources.size, 256);
                assert_eq!(device.texture_format(image.resources.output), Some(ImageFormat::Rgba8Unorm));
            }
            other => panic!("expected image payload, got {other:?}"),
        }

        let shader = registry.instantiate(&mut device, catalog.get("pbr_material").unwrap()).unwrap();
        match shader {
            NodePayload::Shader(shader) => assert_eq!(shader.resources.transfers.len(), 5),
            other => panic!("expected shader payload, got {other:?}"),
        }
    }

    #[test]
    fn uniform_block_bytes() {
        let block = UniformBlock(vec![1.0, 2.0]);
        assert_eq!(block.as_bytes().len(), 8);
    }
}
