// SPDX-License-Identifier: MIT OR Apache-2.0
//! Device abstraction consumed by the execution engine.
//!
//! The engine never talks to a graphics API directly. Everything it needs
//! from the device (allocating per-node resources, writing uniforms, binding
//! textures, querying timeline semaphores and submitting batches) goes
//! through the [`Device`] trait. [`crate::headless::HeadlessDevice`] is an
//! in-memory implementation used by tests and the command-line runner.

use crate::error::DeviceResult;
use crate::node::NodeId;
use crate::value::GradientStop;
use serde::{Deserialize, Serialize};
use std::time::Duration;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

handle!(
    /// Device texture
    TextureHandle
);
handle!(
    /// Uniform buffer
    BufferHandle
);
handle!(
    /// Descriptor set holding a node's texture bindings
    DescriptorHandle
);
handle!(
    /// Timeline semaphore (monotonic completion counter)
    SemaphoreHandle
);
handle!(
    /// Recorded command buffer
    CommandBufferHandle
);
handle!(
    /// Completion fence for a whole submission batch
    FenceHandle
);
handle!(
    /// Compiled pipeline for one node kernel
    PipelineHandle
);

/// Pixel format of a node's output image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageFormat {
    /// 8-bit normalized RGBA
    #[default]
    Rgba8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 32-bit float RGBA
    Rgba32Float,
    /// 8-bit normalized single channel
    R8Unorm,
    /// 16-bit float single channel
    R16Float,
}

impl ImageFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Rgba8Unorm => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
            Self::R8Unorm => 1,
            Self::R16Float => 2,
        }
    }
}

/// Resources owned by an image-processing node
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResources {
    /// Uniform buffer holding packed input values
    pub uniforms: BufferHandle,
    /// Texture bindings for the node's inputs
    pub descriptor: DescriptorHandle,
    /// Output image
    pub output: TextureHandle,
    /// Completion counter of this node's submissions
    pub semaphore: SemaphoreHandle,
    /// Commands rendering the output
    pub compute: CommandBufferHandle,
    /// Commands transitioning the output for sampling
    pub make_visible: CommandBufferHandle,
    /// Handle the UI draws the output with
    pub display: egui::TextureId,
    /// Output pixel format
    pub format: ImageFormat,
    /// Output width and height
    pub size: u32,
}

/// Resources owned by a shader parameter node
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderResources {
    /// Uniform buffer holding packed input values
    pub uniforms: BufferHandle,
    /// Texture bindings consumed by the renderer
    pub descriptor: DescriptorHandle,
    /// One transfer command per input slot, copying an upstream image in
    pub transfers: Vec<CommandBufferHandle>,
}

/// Allocation request for an image node
#[derive(Debug, Clone)]
pub struct ImageNodeDesc<'a> {
    /// Debug label
    pub label: &'a str,
    /// Pipeline from the resource registry
    pub pipeline: PipelineHandle,
    /// Output width and height
    pub size: u32,
    /// Output pixel format
    pub format: ImageFormat,
    /// Number of input slots
    pub input_slots: usize,
    /// Number of `f32` lanes in the uniform block
    pub uniform_lanes: usize,
}

/// Allocation request for a shader node
#[derive(Debug, Clone)]
pub struct ShaderNodeDesc<'a> {
    /// Debug label
    pub label: &'a str,
    /// Pipeline from the resource registry
    pub pipeline: PipelineHandle,
    /// Number of input slots
    pub input_slots: usize,
    /// Number of `f32` lanes in the uniform block
    pub uniform_lanes: usize,
}

/// A semaphore and the counter value a submission waits for or signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePoint {
    /// Semaphore
    pub semaphore: SemaphoreHandle,
    /// Counter value
    pub value: u64,
}

/// Which part of a node's work a submission carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    /// Render the output image
    Compute,
    /// Make the output visible to samplers
    MakeVisible,
    /// Copy an upstream image into a shader node input slot
    Transfer {
        /// Input slot of the shader node
        slot: usize,
    },
}

/// One entry of a batched device submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Node the work belongs to
    pub node: NodeId,
    /// Phase of the node's work
    pub phase: SubmissionPhase,
    /// Commands to execute
    pub command_buffer: CommandBufferHandle,
    /// Semaphore values that must be reached first
    pub waits: Vec<TimelinePoint>,
    /// Semaphore values set on completion
    pub signals: Vec<TimelinePoint>,
}

/// Device capabilities the graph engine depends on
pub trait Device {
    /// Build the pipeline for a node kernel
    fn create_pipeline(&mut self, kernel: &str, format: ImageFormat) -> DeviceResult<PipelineHandle>;

    /// Allocate an image node's output, uniforms, bindings, semaphore and commands
    fn create_image_node(&mut self, desc: &ImageNodeDesc<'_>) -> DeviceResult<ImageResources>;

    /// Allocate a shader node's uniforms, bindings and transfer commands
    fn create_shader_node(&mut self, desc: &ShaderNodeDesc<'_>) -> DeviceResult<ShaderResources>;

    /// Free an image node's resources
    fn release_image_node(&mut self, resources: &ImageResources);

    /// Free a shader node's resources
    fn release_shader_node(&mut self, resources: &ShaderResources);

    /// Replace an image node's output with one of a different format.
    ///
    /// Updates `resources.output`, `resources.display` and `resources.format`.
    fn recreate_output(&mut self, resources: &mut ImageResources, format: ImageFormat) -> DeviceResult<()>;

    /// Overwrite a uniform buffer
    fn write_uniforms(&mut self, buffer: BufferHandle, bytes: &[u8]) -> DeviceResult<()>;

    /// Bind a texture into a descriptor slot, or unbind with `None`
    fn bind_texture(
        &mut self,
        descriptor: DescriptorHandle,
        slot: usize,
        texture: Option<TextureHandle>,
    ) -> DeviceResult<()>;

    /// Upload a gradient ramp, replacing `previous` if given
    fn upload_gradient(
        &mut self,
        stops: &[GradientStop],
        previous: Option<TextureHandle>,
    ) -> DeviceResult<TextureHandle>;

    /// Current counter value of a semaphore
    fn counter_value(&self, semaphore: SemaphoreHandle) -> DeviceResult<u64>;

    /// Create a completion fence in the signaled state
    fn create_fence(&mut self) -> DeviceResult<FenceHandle>;

    /// Non-blocking check of a fence
    fn fence_signaled(&self, fence: FenceHandle) -> DeviceResult<bool>;

    /// Block until the fence signals or the timeout expires
    fn wait_fence(&mut self, fence: FenceHandle, timeout: Duration) -> DeviceResult<()>;

    /// Destroy a fence that is no longer waited on
    fn destroy_fence(&mut self, fence: FenceHandle);

    /// Put the fence back into the unsignaled state
    fn reset_fence(&mut self, fence: FenceHandle) -> DeviceResult<()>;

    /// Submit a batch; `fence` signals once every entry has completed
    fn submit(&mut self, batch: &[Submission], fence: FenceHandle) -> DeviceResult<()>;
}
