// SPDX-License-Identifier: MIT OR Apache-2.0
//! The engine: graph, device and scheduling policy in one place.
//!
//! Every edit goes through [`Engine`]. Structural edits update the graph,
//! device-side state is kept in step, and the affected part of the graph is
//! recomputed. Incremental updates never block: while a batch is still in
//! flight the request is parked and picked up by [`Engine::poll`]. Edits
//! that touch device resources, full rebuilds and session loads wait for
//! the fence first.
//!
//! A device failure leaves the engine *stale*: incremental updates are
//! refused until [`Engine::rebuild_all`] succeeds. Edits are still applied
//! to a stale graph, but their recompute waits for that rebuild.

use crate::catalog::standard_catalog;
use crate::device::{Device, FenceHandle};
use crate::error::{ConnectionError, DeviceError, EngineError, Result};
use crate::execution::{self, ExecutionReport};
use crate::graph::Graph;
use crate::link::{Link, LinkId};
use crate::node::{Node, NodeId, NodeRegistry};
use crate::pin::{PinDirection, PinId};
use crate::resources::{self, ResourceRegistry};
use crate::schedule::Schedule;
use crate::session::Session;
use crate::settings::EngineSettings;
use crate::validation;
use crate::value::PinValue;
use crate::view::ViewState;
use std::path::Path;

/// Result of asking for a recompute
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The schedule ran and its batch was submitted
    Submitted(ExecutionReport),
    /// A batch is in flight; the request runs on a later [`Engine::poll`]
    Deferred,
}

/// Recompute waiting for the fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    From(NodeId),
    Full,
}

impl Pending {
    fn merge(self, root: NodeId) -> Self {
        match self {
            Self::From(existing) if existing == root => self,
            _ => Self::Full,
        }
    }
}

/// Node graph engine driving a device
pub struct Engine<D: Device> {
    graph: Graph,
    device: D,
    catalog: NodeRegistry,
    kernels: ResourceRegistry,
    settings: EngineSettings,
    fence: FenceHandle,
    pending: Option<Pending>,
    stale: Option<String>,
    displayed: Option<NodeId>,
    view: ViewState,
}

impl<D: Device> Engine<D> {
    /// Create an engine with the standard catalog
    pub fn new(device: D, settings: EngineSettings) -> Result<Self> {
        Self::with_catalog(device, settings, standard_catalog())
    }

    /// Create an engine with a custom catalog
    pub fn with_catalog(mut device: D, settings: EngineSettings, catalog: NodeRegistry) -> Result<Self> {
        let kernels = ResourceRegistry::new(
            &mut device,
            &catalog,
            settings.default_format,
            settings.output_size,
        )?;
        let fence = device.create_fence()?;

        tracing::info!(
            node_types = catalog.len(),
            output_size = settings.output_size,
            format = ?settings.default_format,
            "Engine ready"
        );
        Ok(Self {
            graph: Graph::new(),
            device,
            catalog,
            kernels,
            settings,
            fence,
            pending: None,
            stale: None,
            displayed: None,
            view: ViewState::new(),
        })
    }

    /// The graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The node catalog
    pub fn catalog(&self) -> &NodeRegistry {
        &self.catalog
    }

    /// Active settings
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable device access
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Canvas view
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Mutable canvas view
    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    /// Nodes in index order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.nodes()
    }

    /// Links in creation order
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.graph.links()
    }

    /// Whether a device failure left the graph out of date
    pub fn is_stale(&self) -> bool {
        self.stale.is_some()
    }

    /// Message of the failure that made the engine stale
    pub fn stale_reason(&self) -> Option<&str> {
        self.stale.as_deref()
    }

    /// Whether a recompute is waiting for the fence
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn fail(&mut self, err: DeviceError) -> EngineError {
        tracing::error!(error = %err, "Device failure, graph is stale");
        self.stale = Some(err.to_string());
        EngineError::Device(err)
    }

    /// Recompute after an edit. A stale graph is left for the next full rebuild.
    fn refresh(&mut self, root: NodeId) -> Result<()> {
        if self.stale.is_some() {
            tracing::debug!(node = %root, "Graph is stale, skipping recompute");
            return Ok(());
        }
        self.update(root).map(|_| ())
    }

    fn is_device_node(&self, id: NodeId) -> bool {
        self.graph.node(id).is_some_and(|n| n.payload.is_device())
    }

    /// Block until the in-flight batch has completed
    pub fn wait_idle(&mut self) -> Result<()> {
        let timeout = self.settings.fence_timeout();
        self.device
            .wait_fence(self.fence, timeout)
            .map_err(|e| self.fail(e))
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Add a node of the given type; nothing is recomputed
    pub fn add_node(&mut self, type_id: &str) -> Result<NodeId> {
        let node_type = self
            .catalog
            .get(type_id)
            .ok_or_else(|| EngineError::UnknownNodeType(type_id.to_string()))?;
        let tag = self
            .catalog
            .tag_of(type_id)
            .ok_or_else(|| EngineError::UnknownNodeType(type_id.to_string()))?;

        let payload = self.kernels.instantiate(&mut self.device, node_type)?;
        let id = self.graph.add_node(node_type, tag, payload);

        if let Some(node) = self.graph.node_mut(id) {
            resources::publish_output(node);
            let prepared = resources::upload_gradients(&mut self.device, node)
                .and_then(|()| resources::sync_node(&mut self.device, node));
            if let Err(err) = prepared {
                if let Some(removed) = self.graph.remove_node(id) {
                    resources::release(&mut self.device, &removed.node);
                }
                return Err(err.into());
            }
        }
        Ok(id)
    }

    /// Add a node at a canvas position
    pub fn add_node_at(&mut self, type_id: &str, position: [f32; 2]) -> Result<NodeId> {
        let id = self.add_node(type_id)?;
        self.graph.set_position(id, position);
        Ok(id)
    }

    /// Remove a node and its links.
    ///
    /// Returns the index the node had, or `None` for an unknown node.
    /// Consumers that lost a producer are recomputed.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Option<usize>> {
        if self.graph.node(id).is_none() {
            return Ok(None);
        }
        let feeds_device = self
            .graph
            .consumers(id)
            .into_iter()
            .filter_map(|pin| self.graph.owner(pin))
            .any(|owner| self.is_device_node(owner));
        if feeds_device || self.is_device_node(id) {
            self.wait_idle()?;
        }

        let Some(removed) = self.graph.remove_node(id) else {
            return Ok(None);
        };
        resources::release(&mut self.device, &removed.node);
        if self.displayed == Some(id) {
            self.displayed = None;
        }

        let mut affected = Vec::new();
        for pin in &removed.orphaned_inputs {
            resources::apply_input(&self.graph, &mut self.device, *pin).map_err(|e| self.fail(e))?;
            if let Some(owner) = self.graph.owner(*pin) {
                if !affected.contains(&owner) {
                    affected.push(owner);
                }
            }
        }
        for owner in affected {
            self.refresh(owner)?;
        }
        Ok(Some(removed.index))
    }

    /// Link an output to an input and recompute downstream of the input.
    ///
    /// A link already feeding the input is replaced.
    pub fn connect(&mut self, output: PinId, input: PinId) -> Result<LinkId> {
        if let Err(err) = validation::is_pin_connection_valid(&self.graph, output, input) {
            tracing::warn!(%output, %input, error = %err, "Rejected link");
            return Err(err.into());
        }

        let consumer = self.graph.owner(input).ok_or(EngineError::UnknownPin(input))?;
        let touches_device = self.is_device_node(consumer);
        if touches_device {
            self.wait_idle()?;
        }

        if let Some(old) = self.graph.link_into(input).map(|l| l.id) {
            self.graph.disconnect(old);
            if touches_device {
                resources::apply_input(&self.graph, &mut self.device, input).map_err(|e| self.fail(e))?;
            }
            tracing::debug!(link = %old, %input, "Evicted link");
        }

        let connected = self.graph.connect(output, input)?;
        if touches_device {
            validation::renegotiate_format(&mut self.graph, &mut self.device, input)
                .and_then(|_| resources::apply_input(&self.graph, &mut self.device, input))
                .map_err(|e| self.fail(e))?;
        }

        self.refresh(consumer)?;
        Ok(connected.link)
    }

    /// Remove a link and recompute its consumer
    pub fn disconnect(&mut self, link: LinkId) -> Result<()> {
        let end = self
            .graph
            .link(link)
            .map(|l| l.end)
            .ok_or(ConnectionError::LinkNotFound(link))?;
        let consumer = self.graph.owner(end).ok_or(EngineError::UnknownPin(end))?;
        let touches_device = self.is_device_node(consumer);
        if touches_device {
            self.wait_idle()?;
        }

        self.graph.disconnect(link);
        if touches_device {
            resources::apply_input(&self.graph, &mut self.device, end).map_err(|e| self.fail(e))?;
        }
        self.refresh(consumer)?;
        Ok(())
    }

    /// Widget edit of an unlinked input
    pub fn set_input_value(&mut self, pin: PinId, value: PinValue) -> Result<()> {
        let current = self.graph.pin(pin).ok_or(EngineError::UnknownPin(pin))?;
        if current.direction != PinDirection::Input {
            return Err(EngineError::UnknownPin(pin));
        }
        if value.pin_type() != current.pin_type {
            return Err(EngineError::ValueTypeMismatch {
                pin,
                expected: current.pin_type,
                found: value.pin_type(),
            });
        }
        if current.is_connected() {
            tracing::warn!(%pin, "Ignored edit of a linked input");
            return Err(EngineError::InputConnected(pin));
        }

        let mut value = value;
        let is_gradient = match (&mut value, &current.literal) {
            (PinValue::Gradient(new), PinValue::Gradient(old)) => {
                new.ramp = old.ramp;
                true
            }
            _ => false,
        };
        let node_id = current.node;

        let touches_device = self.is_device_node(node_id);
        if touches_device {
            self.wait_idle()?;
        }
        self.graph.set_literal(pin, value);

        if touches_device {
            let synced = match self.graph.node_mut(node_id) {
                Some(node) if is_gradient => resources::upload_gradients(&mut self.device, node),
                _ => Ok(()),
            };
            synced
                .and_then(|()| resources::apply_input(&self.graph, &mut self.device, pin))
                .map_err(|e| self.fail(e))?;
        }

        self.refresh(node_id)?;
        Ok(())
    }

    /// Move a node on the canvas
    pub fn set_position(&mut self, id: NodeId, position: [f32; 2]) -> Result<()> {
        if self.graph.set_position(id, position) {
            Ok(())
        } else {
            Err(EngineError::UnknownNode(id))
        }
    }

    /// Rename a node
    pub fn set_label(&mut self, id: NodeId, label: impl Into<String>) -> Result<()> {
        let node = self.graph.node_mut(id).ok_or(EngineError::UnknownNode(id))?;
        node.label = label.into();
        Ok(())
    }

    /// Remove every node, releasing device resources
    pub fn clear(&mut self) -> Result<()> {
        self.wait_idle()?;
        for node in self.graph.clear() {
            resources::release(&mut self.device, &node);
        }
        self.pending = None;
        self.displayed = None;
        tracing::info!("Cleared graph");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recompute
    // ------------------------------------------------------------------

    /// Recompute everything downstream of `root` without blocking
    pub fn update(&mut self, root: NodeId) -> Result<UpdateOutcome> {
        if let Some(reason) = &self.stale {
            return Err(EngineError::Stale(reason.clone()));
        }
        if self.graph.node(root).is_none() {
            return Err(EngineError::UnknownNode(root));
        }

        let request = match self.pending.take() {
            Some(pending) => pending.merge(root),
            None => Pending::From(root),
        };

        let idle = self.device.fence_signaled(self.fence).map_err(|e| self.fail(e))?;
        if !idle {
            tracing::debug!(?request, "Batch in flight, deferring update");
            self.pending = Some(request);
            return Ok(UpdateOutcome::Deferred);
        }

        self.run(request).map(UpdateOutcome::Submitted)
    }

    /// Run a parked update once the in-flight batch has completed
    pub fn poll(&mut self) -> Result<Option<ExecutionReport>> {
        let Some(request) = self.pending else {
            return Ok(None);
        };
        if let Some(reason) = &self.stale {
            return Err(EngineError::Stale(reason.clone()));
        }
        if !self.device.fence_signaled(self.fence).map_err(|e| self.fail(e))? {
            return Ok(None);
        }
        self.pending = None;
        self.run(request).map(Some)
    }

    /// Recompute the whole graph, waiting for in-flight work first.
    ///
    /// Clears the stale state on success.
    pub fn rebuild_all(&mut self) -> Result<ExecutionReport> {
        self.wait_idle()?;
        self.pending = None;
        let report = self.run(Pending::Full)?;
        if self.stale.take().is_some() {
            tracing::info!("Full rebuild recovered from stale state");
        }
        Ok(report)
    }

    fn run(&mut self, request: Pending) -> Result<ExecutionReport> {
        let schedule = match request {
            Pending::Full => Schedule::full(&self.graph),
            Pending::From(root) => match Schedule::incremental(&self.graph, root) {
                Some(schedule) => schedule,
                None => Schedule::full(&self.graph),
            },
        };
        match execution::execute(&mut self.graph, &mut self.device, &schedule, self.fence) {
            Ok(report) => Ok(report),
            Err(err) => {
                // The fence may have been reset without a submission to signal it.
                if let Ok(fence) = self.device.create_fence() {
                    let old = std::mem::replace(&mut self.fence, fence);
                    self.device.destroy_fence(old);
                }
                Err(self.fail(err))
            }
        }
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Write the graph and view to a session file
    pub fn save_session(&self, path: &Path) -> Result<()> {
        Session::capture(&self.graph, &self.view).save(path)?;
        Ok(())
    }

    /// Replace the graph with a session file and rebuild.
    ///
    /// If the file is rejected the current graph stays untouched.
    pub fn load_session(&mut self, path: &Path) -> Result<ExecutionReport> {
        let session = Session::load(path)?;
        self.apply_session(&session)
    }

    /// Replace the graph with an in-memory session and rebuild
    pub fn apply_session(&mut self, session: &Session) -> Result<ExecutionReport> {
        self.wait_idle()?;
        let staged = session.stage(&mut self.device, &self.catalog, &self.kernels)?;

        let mut old = std::mem::replace(&mut self.graph, staged);
        for node in old.clear() {
            resources::release(&mut self.device, &node);
        }
        self.view = ViewState::from(session.view);
        self.displayed = None;
        self.pending = None;

        tracing::info!(
            nodes = self.graph.node_count(),
            links = self.graph.link_count(),
            "Loaded session"
        );
        self.rebuild_all()
    }

    // ------------------------------------------------------------------
    // UI queries
    // ------------------------------------------------------------------

    /// Whether the node is the one shown in the preview
    pub fn is_displayed(&self, id: NodeId) -> bool {
        self.displayed == Some(id)
    }

    /// Show a node in the preview, or nothing
    pub fn set_displayed(&mut self, id: Option<NodeId>) -> Result<()> {
        if let Some(id) = id {
            if self.graph.node(id).is_none() {
                return Err(EngineError::UnknownNode(id));
            }
        }
        self.displayed = id;
        Ok(())
    }

    /// Texture to draw for an image node, once its latest output is complete
    pub fn display_handle(&self, id: NodeId) -> Option<egui::TextureId> {
        let image = self.graph.node(id)?.as_image()?;
        if image.token.signal() == 0 {
            return None;
        }
        let counter = self.device.counter_value(image.resources.semaphore).ok()?;
        image
            .token
            .is_complete(counter)
            .then_some(image.resources.display)
    }

    /// Current value of a pin
    pub fn pin_value(&self, pin: PinId) -> Option<&PinValue> {
        self.graph.pin(pin).map(|p| &p.value)
    }
}

impl<D: Device> Drop for Engine<D> {
    fn drop(&mut self) {
        let _ = self.device.wait_fence(self.fence, self.settings.fence_timeout());
        for node in self.graph.clear() {
            resources::release(&mut self.device, &node);
        }
        self.device.destroy_fence(self.fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    fn engine() -> Engine<HeadlessDevice> {
        Engine::new(HeadlessDevice::new(), EngineSettings::default()).unwrap()
    }

    fn input(engine: &Engine<HeadlessDevice>, node: NodeId, slot: usize) -> PinId {
        engine.graph().node(node).unwrap().inputs[slot].id
    }

    fn output(engine: &Engine<HeadlessDevice>, node: NodeId) -> PinId {
        engine.graph().node(node).unwrap().outputs[0].id
    }

    #[test]
    fn add_node_does_not_submit() {
        let mut engine = engine();
        engine.add_node("perlin_noise").unwrap();
        assert_eq!(engine.device().stats().batches, 0);
        assert!(matches!(
            engine.add_node("teapot"),
            Err(EngineError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn pending_requests_merge() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_eq!(Pending::From(a).merge(a), Pending::From(a));
        assert_eq!(Pending::From(a).merge(b), Pending::Full);
        assert_eq!(Pending::Full.merge(a), Pending::Full);
    }

    #[test]
    fn widget_edit_checks_type_and_links() {
        let mut engine = engine();
        let a = engine.add_node("float").unwrap();
        let b = engine.add_node("float").unwrap();
        let a_in = input(&engine, a, 0);

        assert!(matches!(
            engine.set_input_value(a_in, PinValue::Int(3)),
            Err(EngineError::ValueTypeMismatch { .. })
        ));

        engine.connect(output(&engine, a), input(&engine, b, 0)).unwrap();
        assert!(matches!(
            engine.set_input_value(input(&engine, b, 0), PinValue::Float(1.0)),
            Err(EngineError::InputConnected(_))
        ));

        engine.set_input_value(a_in, PinValue::Float(4.0)).unwrap();
        assert_eq!(
            engine.pin_value(output(&engine, b)),
            Some(&PinValue::Float(4.0))
        );
    }

    #[test]
    fn display_handle_waits_for_completion() {
        let mut engine = engine();
        let noise = engine.add_node("perlin_noise").unwrap();
        assert!(engine.display_handle(noise).is_none());

        engine.device_mut().set_deferred(true);
        engine.update(noise).unwrap();
        assert!(engine.display_handle(noise).is_none());

        engine.device_mut().complete_pending().unwrap();
        assert!(engine.display_handle(noise).is_some());
    }

    #[test]
    fn displayed_node_is_tracked() {
        let mut engine = engine();
        let noise = engine.add_node("perlin_noise").unwrap();
        engine.set_displayed(Some(noise)).unwrap();
        assert!(engine.is_displayed(noise));
        engine.remove_node(noise).unwrap();
        assert!(!engine.is_displayed(noise));
        assert!(engine.set_displayed(Some(noise)).is_err());
    }

    #[test]
    fn removing_unknown_node_is_noop() {
        let mut engine = engine();
        assert_eq!(engine.remove_node(NodeId::new()).unwrap(), None);
    }

    #[test]
    fn gradient_edit_reuploads_ramp() {
        let mut engine = engine();
        let map = engine.add_node("gradient_map").unwrap();
        assert_eq!(engine.device().stats().gradient_uploads, 1);

        let gradient = crate::value::Gradient::new(vec![
            crate::value::GradientStop::new(0.0, [1.0, 0.0, 0.0, 1.0]),
            crate::value::GradientStop::new(1.0, [0.0, 0.0, 1.0, 1.0]),
        ]);
        engine
            .set_input_value(input(&engine, map, 1), PinValue::Gradient(gradient))
            .unwrap();
        assert_eq!(engine.device().stats().gradient_uploads, 2);

        let ramp = engine.pin_value(input(&engine, map, 1)).unwrap().texture().unwrap();
        assert_eq!(engine.device().gradient(ramp).unwrap()[0].color, [1.0, 0.0, 0.0, 1.0]);
    }
}
