// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory device for tests and headless runs.
//!
//! The headless device hands out opaque handles, stores uniform writes and
//! texture bindings so they can be inspected, and executes submission
//! batches by advancing timeline counters in batch order. A wait that cannot
//! be satisfied at its position in the batch is reported as
//! [`DeviceError::UnsatisfiedWait`], which makes ordering mistakes visible
//! without a GPU.
//!
//! # Modes
//!
//! - Immediate (default): a batch completes during [`Device::submit`].
//! - Deferred: batches stay in flight until [`HeadlessDevice::complete_pending`]
//!   or a fence wait, so non-blocking update paths can be exercised.
//! - Stalled: fence waits time out.

use crate::device::{
    BufferHandle, CommandBufferHandle, DescriptorHandle, Device, FenceHandle, ImageFormat,
    ImageNodeDesc, ImageResources, PipelineHandle, SemaphoreHandle, ShaderNodeDesc,
    ShaderResources, Submission, TextureHandle,
};
use crate::error::{DeviceError, DeviceResult};
use crate::value::GradientStop;
use std::collections::HashMap;
use std::time::Duration;

/// Counters of device activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Batches submitted
    pub batches: usize,
    /// Submissions across all batches
    pub submissions: usize,
    /// Uniform buffer writes
    pub uniform_writes: usize,
    /// Descriptor binding updates
    pub binding_updates: usize,
    /// Output images recreated at a new format
    pub recreated_outputs: usize,
    /// Gradient ramps uploaded
    pub gradient_uploads: usize,
}

/// Device that executes everything in memory
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_handle: u64,
    counters: HashMap<SemaphoreHandle, u64>,
    fences: HashMap<FenceHandle, bool>,
    uniforms: HashMap<BufferHandle, Vec<u8>>,
    bindings: HashMap<(DescriptorHandle, usize), Option<TextureHandle>>,
    textures: HashMap<TextureHandle, ImageFormat>,
    gradients: HashMap<TextureHandle, Vec<GradientStop>>,
    pipelines: HashMap<PipelineHandle, String>,
    history: Vec<Vec<Submission>>,
    in_flight: Vec<(Vec<Submission>, FenceHandle)>,
    deferred: bool,
    stalled: bool,
    fail_next_submit: bool,
    fail_allocations: bool,
    stats: HeadlessStats,
}

impl HeadlessDevice {
    /// Create a device that completes work immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep submitted batches in flight until completed explicitly
    pub fn with_deferred_completion(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Toggle deferred completion
    pub fn set_deferred(&mut self, deferred: bool) {
        self.deferred = deferred;
    }

    /// Make fence waits time out while set
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Reject the next submission
    pub fn fail_next_submit(&mut self) {
        self.fail_next_submit = true;
    }

    /// Reject allocations while set
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Execute every in-flight batch
    pub fn complete_pending(&mut self) -> DeviceResult<()> {
        for (batch, fence) in std::mem::take(&mut self.in_flight) {
            self.execute(&batch)?;
            if let Some(signaled) = self.fences.get_mut(&fence) {
                *signaled = true;
            }
            self.history.push(batch);
        }
        Ok(())
    }

    /// Whether a batch is still in flight
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Completed batches, oldest first
    pub fn history(&self) -> &[Vec<Submission>] {
        &self.history
    }

    /// Most recently completed batch
    pub fn last_batch(&self) -> Option<&[Submission]> {
        self.history.last().map(Vec::as_slice)
    }

    /// Activity counters
    pub fn stats(&self) -> &HeadlessStats {
        &self.stats
    }

    /// Last uniform block written to a buffer, decoded as `f32` lanes
    pub fn uniforms(&self, buffer: BufferHandle) -> Option<Vec<f32>> {
        self.uniforms
            .get(&buffer)
            .map(|bytes| bytemuck::pod_collect_to_vec::<u8, f32>(bytes.as_slice()))
    }

    /// Texture bound in a descriptor slot
    pub fn binding(&self, descriptor: DescriptorHandle, slot: usize) -> Option<TextureHandle> {
        self.bindings.get(&(descriptor, slot)).copied().flatten()
    }

    /// Format of a live texture
    pub fn texture_format(&self, texture: TextureHandle) -> Option<ImageFormat> {
        self.textures.get(&texture).copied()
    }

    /// Stops uploaded to a gradient ramp
    pub fn gradient(&self, texture: TextureHandle) -> Option<&[GradientStop]> {
        self.gradients.get(&texture).map(Vec::as_slice)
    }

    /// Number of live textures
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of fences not yet destroyed
    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check_allocation(&self, what: &str) -> DeviceResult<()> {
        if self.fail_allocations {
            return Err(DeviceError::AllocationFailed(what.to_string()));
        }
        Ok(())
    }

    fn new_texture(&mut self, format: ImageFormat) -> TextureHandle {
        let texture = TextureHandle(self.next());
        self.textures.insert(texture, format);
        texture
    }

    fn execute(&mut self, batch: &[Submission]) -> DeviceResult<()> {
        let mut counters = self.counters.clone();
        for submission in batch {
            for wait in &submission.waits {
                let current = counters.get(&wait.semaphore).copied().unwrap_or(0);
                if current < wait.value {
                    return Err(DeviceError::UnsatisfiedWait {
                        label: format!("{}/{:?}", submission.node, submission.phase),
                        semaphore: wait.semaphore,
                        value: wait.value,
                        current,
                    });
                }
            }
            for signal in &submission.signals {
                let counter = counters.entry(signal.semaphore).or_insert(0);
                *counter = (*counter).max(signal.value);
            }
        }
        self.counters = counters;
        Ok(())
    }
}

impl Device for HeadlessDevice {
    fn create_pipeline(&mut self, kernel: &str, _format: ImageFormat) -> DeviceResult<PipelineHandle> {
        self.check_allocation(kernel)?;
        let pipeline = PipelineHandle(self.next());
        self.pipelines.insert(pipeline, kernel.to_string());
        Ok(pipeline)
    }

    fn create_image_node(&mut self, desc: &ImageNodeDesc<'_>) -> DeviceResult<ImageResources> {
        self.check_allocation(desc.label)?;
        if !self.pipelines.contains_key(&desc.pipeline) {
            return Err(DeviceError::UnknownHandle(desc.pipeline.0));
        }

        let output = self.new_texture(desc.format);
        let semaphore = SemaphoreHandle(self.next());
        self.counters.insert(semaphore, 0);
        let uniforms = BufferHandle(self.next());
        self.uniforms.insert(uniforms, vec![0; desc.uniform_lanes * 4]);

        Ok(ImageResources {
            uniforms,
            descriptor: DescriptorHandle(self.next()),
            output,
            semaphore,
            compute: CommandBufferHandle(self.next()),
            make_visible: CommandBufferHandle(self.next()),
            display: egui::TextureId::User(output.0),
            format: desc.format,
            size: desc.size,
        })
    }

    fn create_shader_node(&mut self, desc: &ShaderNodeDesc<'_>) -> DeviceResult<ShaderResources> {
        self.check_allocation(desc.label)?;
        if !self.pipelines.contains_key(&desc.pipeline) {
            return Err(DeviceError::UnknownHandle(desc.pipeline.0));
        }

        let uniforms = BufferHandle(self.next());
        self.uniforms.insert(uniforms, vec![0; desc.uniform_lanes * 4]);
        let descriptor = DescriptorHandle(self.next());
        let transfers = (0..desc.input_slots)
            .map(|_| CommandBufferHandle(self.next()))
            .collect();

        Ok(ShaderResources {
            uniforms,
            descriptor,
            transfers,
        })
    }

    fn release_image_node(&mut self, resources: &ImageResources) {
        self.textures.remove(&resources.output);
        self.uniforms.remove(&resources.uniforms);
        self.counters.remove(&resources.semaphore);
        self.bindings.retain(|(d, _), _| *d != resources.descriptor);
    }

    fn release_shader_node(&mut self, resources: &ShaderResources) {
        self.uniforms.remove(&resources.uniforms);
        self.bindings.retain(|(d, _), _| *d != resources.descriptor);
    }

    fn recreate_output(&mut self, resources: &mut ImageResources, format: ImageFormat) -> DeviceResult<()> {
        self.check_allocation("recreated output")?;
        self.textures.remove(&resources.output);
        let output = self.new_texture(format);
        resources.output = output;
        resources.display = egui::TextureId::User(output.0);
        resources.format = format;
        self.stats.recreated_outputs += 1;
        Ok(())
    }

    fn write_uniforms(&mut self, buffer: BufferHandle, bytes: &[u8]) -> DeviceResult<()> {
        let slot = self
            .uniforms
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownHandle(buffer.0))?;
        slot.clear();
        slot.extend_from_slice(bytes);
        self.stats.uniform_writes += 1;
        Ok(())
    }

    fn bind_texture(
        &mut self,
        descriptor: DescriptorHandle,
        slot: usize,
        texture: Option<TextureHandle>,
    ) -> DeviceResult<()> {
        if let Some(texture) = texture {
            if !self.textures.contains_key(&texture) {
                return Err(DeviceError::UnknownHandle(texture.0));
            }
        }
        self.bindings.insert((descriptor, slot), texture);
        self.stats.binding_updates += 1;
        Ok(())
    }

    fn upload_gradient(
        &mut self,
        stops: &[GradientStop],
        previous: Option<TextureHandle>,
    ) -> DeviceResult<TextureHandle> {
        self.check_allocation("gradient ramp")?;
        if let Some(previous) = previous {
            self.textures.remove(&previous);
            self.gradients.remove(&previous);
        }
        let ramp = self.new_texture(ImageFormat::Rgba8Unorm);
        self.gradients.insert(ramp, stops.to_vec());
        self.stats.gradient_uploads += 1;
        Ok(ramp)
    }

    fn counter_value(&self, semaphore: SemaphoreHandle) -> DeviceResult<u64> {
        self.counters
            .get(&semaphore)
            .copied()
            .ok_or(DeviceError::UnknownHandle(semaphore.0))
    }

    fn create_fence(&mut self) -> DeviceResult<FenceHandle> {
        let fence = FenceHandle(self.next());
        self.fences.insert(fence, true);
        Ok(fence)
    }

    fn fence_signaled(&self, fence: FenceHandle) -> DeviceResult<bool> {
        self.fences
            .get(&fence)
            .copied()
            .ok_or(DeviceError::UnknownHandle(fence.0))
    }

    fn wait_fence(&mut self, fence: FenceHandle, timeout: Duration) -> DeviceResult<()> {
        if self.fence_signaled(fence)? {
            return Ok(());
        }
        if self.stalled {
            return Err(DeviceError::Timeout(timeout));
        }
        self.complete_pending()
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        self.fences.remove(&fence);
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> DeviceResult<()> {
        let state = self
            .fences
            .get_mut(&fence)
            .ok_or(DeviceError::UnknownHandle(fence.0))?;
        *state = false;
        Ok(())
    }

    fn submit(&mut self, batch: &[Submission], fence: FenceHandle) -> DeviceResult<()> {
        if std::mem::take(&mut self.fail_next_submit) {
            return Err(DeviceError::SubmissionFailed("injected failure".to_string()));
        }
        if !self.fences.contains_key(&fence) {
            return Err(DeviceError::UnknownHandle(fence.0));
        }

        self.stats.batches += 1;
        self.stats.submissions += batch.len();

        if self.deferred {
            self.fences.insert(fence, false);
            self.in_flight.push((batch.to_vec(), fence));
            return Ok(());
        }

        self.execute(batch)?;
        self.fences.insert(fence, true);
        self.history.push(batch.to_vec());
        Ok(())
    }
}
