// SPDX-License-Identifier: MIT OR Apache-2.0
//! One execution pass over a schedule.
//!
//! The pass walks the schedule producer-first. Value nodes are evaluated on
//! the spot and their results pushed downstream. Image nodes arm a
//! [`CompletionToken`] from their current counter, hand wait entries to
//! image consumers and gated transfers to shader consumers, and append their
//! own two submissions. Everything is submitted as a single batch at the end.

use crate::device::{Device, FenceHandle, Submission, SubmissionPhase, TimelinePoint};
use crate::error::DeviceResult;
use crate::graph::Graph;
use crate::node::{NodeId, NodePayload};
use crate::resources;
use crate::schedule::Schedule;
use crate::sync::{CompletionToken, WaitEntry};

/// What an execution pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Nodes in the order they were processed
    pub order: Vec<NodeId>,
    /// Value nodes that were evaluated
    pub recomputed: Vec<NodeId>,
    /// Number of submissions in the batch
    pub submissions: usize,
    /// Tokens armed for image nodes
    pub tokens: Vec<(NodeId, CompletionToken)>,
}

/// Run every node of `schedule` and submit the device work.
///
/// Device failures abort the pass before anything is submitted, leaving
/// value nodes evaluated up to the failing node.
pub fn execute(
    graph: &mut Graph,
    device: &mut dyn Device,
    schedule: &Schedule,
    fence: FenceHandle,
) -> DeviceResult<ExecutionReport> {
    let mut report = ExecutionReport {
        order: schedule.order.clone(),
        ..Default::default()
    };

    for id in &schedule.order {
        if let Some(image) = graph.node_mut(*id).and_then(|n| n.as_image_mut()) {
            image.waits.clear();
        }
    }

    let mut batch = Vec::new();
    for id in &schedule.order {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        match &node.payload {
            NodePayload::Value(_) => {
                evaluate_value(graph, device, *id)?;
                report.recomputed.push(*id);
            }
            NodePayload::Image(_) => {
                let token = wire_image(graph, device, *id, &mut batch)?;
                report.tokens.push((*id, token));
            }
            NodePayload::Shader(_) => {}
        }
    }

    report.submissions = batch.len();
    if !batch.is_empty() {
        device.reset_fence(fence)?;
        device.submit(&batch, fence)?;
    }

    tracing::debug!(
        nodes = report.order.len(),
        recomputed = report.recomputed.len(),
        submissions = report.submissions,
        "Executed schedule"
    );
    Ok(report)
}

fn evaluate_value(graph: &mut Graph, device: &mut dyn Device, id: NodeId) -> DeviceResult<()> {
    let inputs = graph.input_values(id);
    let Some(node) = graph.node_mut(id) else {
        return Ok(());
    };
    let NodePayload::Value(op) = node.payload else {
        return Ok(());
    };
    let result = op.evaluate(&inputs);
    let Some(output) = node.outputs.first_mut() else {
        return Ok(());
    };
    output.value = result;
    let output = output.id;

    graph.push_output(output);
    let targets = graph.pin(output).map(|p| p.connected.clone()).unwrap_or_default();
    for target in targets {
        resources::apply_input(graph, device, target)?;
    }
    Ok(())
}

fn wire_image(
    graph: &mut Graph,
    device: &mut dyn Device,
    id: NodeId,
    batch: &mut Vec<Submission>,
) -> DeviceResult<CompletionToken> {
    let Some(image) = graph.node(id).and_then(|n| n.as_image()) else {
        return Ok(CompletionToken::default());
    };
    let resources = image.resources.clone();
    let waits: Vec<TimelinePoint> = image.waits.iter().map(|w| w.point).collect();

    let token = CompletionToken::arm(device.counter_value(resources.semaphore)?);
    let ready = token.wait_point(resources.semaphore);

    let mut transfers = Vec::new();
    for pin in graph.consumers(id) {
        let Some(address) = graph.pin_address(pin) else {
            continue;
        };
        let Some(consumer) = graph.node_mut(address.node) else {
            continue;
        };
        match &mut consumer.payload {
            NodePayload::Image(downstream) => downstream.waits.push(WaitEntry {
                producer: id,
                point: ready,
            }),
            NodePayload::Shader(shader) => {
                if let Some(command_buffer) = shader.resources.transfers.get(address.slot) {
                    transfers.push(Submission {
                        node: address.node,
                        phase: SubmissionPhase::Transfer { slot: address.slot },
                        command_buffer: *command_buffer,
                        waits: vec![ready],
                        signals: Vec::new(),
                    });
                }
            }
            NodePayload::Value(_) => {}
        }
    }

    batch.push(Submission {
        node: id,
        phase: SubmissionPhase::Compute,
        command_buffer: resources.compute,
        waits,
        signals: vec![TimelinePoint {
            semaphore: resources.semaphore,
            value: token.compute_signal(),
        }],
    });
    batch.push(Submission {
        node: id,
        phase: SubmissionPhase::MakeVisible,
        command_buffer: resources.make_visible,
        waits: vec![TimelinePoint {
            semaphore: resources.semaphore,
            value: token.compute_signal(),
        }],
        signals: vec![ready],
    });
    batch.extend(transfers);

    if let Some(image) = graph.node_mut(id).and_then(|n| n.as_image_mut()) {
        image.token = token;
    }
    tracing::trace!(node = %id, observed = token.observed(), signal = token.signal(), "Armed image node");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard_catalog;
    use crate::device::ImageFormat;
    use crate::headless::HeadlessDevice;
    use crate::node::NodeRegistry;
    use crate::pin::PinId;
    use crate::resources::ResourceRegistry;
    use crate::value::PinValue;

    struct Fixture {
        graph: Graph,
        device: HeadlessDevice,
        catalog: NodeRegistry,
        registry: ResourceRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let mut device = HeadlessDevice::new();
            let catalog = standard_catalog();
            let registry = ResourceRegistry::new(&mut device, &catalog, ImageFormat::Rgba8Unorm, 64).unwrap();
            Self {
                graph: Graph::new(),
                device,
                catalog,
                registry,
            }
        }

        fn add(&mut self, type_id: &str) -> NodeId {
            let node_type = self.catalog.get(type_id).unwrap();
            let tag = self.catalog.tag_of(type_id).unwrap();
            let payload = self.registry.instantiate(&mut self.device, node_type).unwrap();
            let id = self.graph.add_node(node_type, tag, payload);
            resources::publish_output(self.graph.node_mut(id).unwrap());
            id
        }

        fn output(&self, node: NodeId) -> PinId {
            self.graph.node(node).unwrap().outputs[0].id
        }

        fn input(&self, node: NodeId, slot: usize) -> PinId {
            self.graph.node(node).unwrap().inputs[slot].id
        }

        fn link(&mut self, from: NodeId, to: NodeId, slot: usize) {
            let (start, end) = (self.output(from), self.input(to, slot));
            self.graph.connect(start, end).unwrap();
            resources::apply_input(&self.graph, &mut self.device, end).unwrap();
        }

        fn run(&mut self, schedule: &Schedule) -> ExecutionReport {
            let fence = self.device.create_fence().unwrap();
            execute(&mut self.graph, &mut self.device, schedule, fence).unwrap()
        }
    }

    #[test]
    fn value_chain_evaluates_in_order() {
        let mut f = Fixture::new();
        let a = f.add("float");
        let b = f.add("math");
        f.graph.set_literal(f.input(a, 0), PinValue::Float(2.0));
        f.graph.set_literal(f.input(b, 1), PinValue::Float(3.0));
        f.link(a, b, 0);

        let schedule = Schedule::incremental(&f.graph, a).unwrap();
        let report = f.run(&schedule);

        assert_eq!(report.recomputed, vec![a, b]);
        assert_eq!(report.submissions, 0);
        assert_eq!(f.graph.pin(f.output(b)).unwrap().value, PinValue::Float(5.0));
    }

    #[test]
    fn image_chain_orders_counters() {
        let mut f = Fixture::new();
        let noise = f.add("perlin_noise");
        let blur = f.add("blur");
        let material = f.add("pbr_material");
        f.link(noise, blur, 0);
        f.link(blur, material, 1);

        let report = f.run(&Schedule::full(&f.graph));
        // compute + make-visible per image node, one gated transfer
        assert_eq!(report.submissions, 5);
        assert_eq!(report.tokens.len(), 2);

        let batch = f.device.last_batch().unwrap();
        let blur_compute = batch
            .iter()
            .find(|s| s.node == blur && s.phase == SubmissionPhase::Compute)
            .unwrap();
        let noise_semaphore = f.graph.node(noise).unwrap().as_image().unwrap().resources.semaphore;
        assert_eq!(
            blur_compute.waits,
            vec![TimelinePoint {
                semaphore: noise_semaphore,
                value: 2
            }]
        );
        assert!(batch
            .iter()
            .any(|s| s.node == material && s.phase == SubmissionPhase::Transfer { slot: 1 }));

        // Second pass arms from the advanced counters.
        let report = f.run(&Schedule::full(&f.graph));
        let (_, token) = report.tokens.iter().find(|(id, _)| *id == noise).unwrap();
        assert_eq!(token.observed(), 2);
        assert_eq!(token.wait_threshold(), 4);
    }

    #[test]
    fn value_into_device_node_writes_uniforms() {
        let mut f = Fixture::new();
        let value = f.add("float");
        let blur = f.add("blur");
        f.graph.set_literal(f.input(value, 0), PinValue::Float(6.5));
        f.link(value, blur, 1);

        f.run(&Schedule::incremental(&f.graph, value).unwrap());

        let uniforms = f.graph.node(blur).unwrap().as_image().unwrap().resources.uniforms;
        let lanes = f.device.uniforms(uniforms).unwrap();
        // Unbound image slot, then the radius.
        assert_eq!(lanes, vec![0.0, 6.5]);
    }

    #[test]
    fn submit_failure_is_reported() {
        let mut f = Fixture::new();
        f.add("voronoi");
        f.device.fail_next_submit();
        let fence = f.device.create_fence().unwrap();
        let schedule = Schedule::full(&f.graph);
        assert!(execute(&mut f.graph, &mut f.device, &schedule, fence).is_err());
    }
}
