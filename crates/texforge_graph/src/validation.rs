// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link validation and the device side effects of accepted links.
//!
//! [`is_pin_connection_valid`] is the only gate for new links: it rejects
//! unknown pins, wrong directions, self links, incompatible types and links
//! that would close a cycle. Once a link is live, [`renegotiate_format`]
//! keeps image chains in one pixel format for inputs marked `auto_format`.

use crate::device::{Device, ImageFormat, TextureHandle};
use crate::error::{ConnectionError, DeviceResult};
use crate::graph::Graph;
use crate::node::NodeId;
use crate::pin::{PinDirection, PinId};
use crate::resources;

/// Check whether `output` may feed `input`.
///
/// The output provides the "from" type and the input the "to" type, so
/// widenings are accepted in one direction only.
pub fn is_pin_connection_valid(graph: &Graph, output: PinId, input: PinId) -> Result<(), ConnectionError> {
    let start = graph.pin(output).ok_or(ConnectionError::PinNotFound(output))?;
    let end = graph.pin(input).ok_or(ConnectionError::PinNotFound(input))?;

    if start.direction != PinDirection::Output || end.direction != PinDirection::Input {
        return Err(ConnectionError::DirectionMismatch);
    }

    if start.node == end.node {
        return Err(ConnectionError::SelfLoop);
    }

    if !start.pin_type.can_connect_to(&end.pin_type) {
        return Err(ConnectionError::IncompatibleTypes {
            from: start.pin_type,
            to: end.pin_type,
        });
    }

    // The new edge runs start.node -> end.node; if end.node already reaches
    // start.node the edge closes a loop.
    if graph.reaches(end.node, start.node) {
        return Err(ConnectionError::WouldCreateCycle(end.node));
    }

    Ok(())
}

/// Make `consumer` render in `producer`'s format if the link into `input`
/// asks for it.
///
/// Recreating an output invalidates the texture its own consumers sampled,
/// so they are rebound, and format-following consumers further down follow
/// the new format as well. Returns the number of outputs recreated.
pub fn renegotiate_format(graph: &mut Graph, device: &mut dyn Device, input: PinId) -> DeviceResult<usize> {
    let Some(pin) = graph.pin(input) else {
        return Ok(0);
    };
    if !pin.auto_format {
        return Ok(0);
    }
    let Some(producer) = graph.link_into(input).and_then(|l| graph.owner(l.start)) else {
        return Ok(0);
    };
    let Some(format) = graph.node(producer).and_then(|n| n.as_image()).map(|i| i.format()) else {
        return Ok(0);
    };

    let mut recreated = 0;
    let mut pending = vec![(pin.node, format)];
    while let Some((node_id, format)) = pending.pop() {
        let Some(texture) = recreate_if_needed(graph, device, node_id, format)? else {
            continue;
        };
        recreated += 1;

        for consumer_pin in rebind_consumers(graph, device, node_id, texture)? {
            let Some(consumer) = graph.pin(consumer_pin) else {
                continue;
            };
            if consumer.auto_format {
                pending.push((consumer.node, format));
            }
        }
    }
    Ok(recreated)
}

fn recreate_if_needed(
    graph: &mut Graph,
    device: &mut dyn Device,
    node_id: NodeId,
    format: ImageFormat,
) -> DeviceResult<Option<TextureHandle>> {
    let Some(node) = graph.node_mut(node_id) else {
        return Ok(None);
    };
    let Some(image) = node.as_image_mut() else {
        return Ok(None);
    };
    if image.format() == format {
        return Ok(None);
    }

    tracing::debug!(node = %node_id, from = ?image.format(), to = ?format, "Renegotiating output format");
    device.recreate_output(&mut image.resources, format)?;
    let texture = image.resources.output;
    resources::publish_output(node);
    Ok(Some(texture))
}

fn rebind_consumers(
    graph: &mut Graph,
    device: &mut dyn Device,
    node_id: NodeId,
    texture: TextureHandle,
) -> DeviceResult<Vec<PinId>> {
    let Some(output) = graph.node(node_id).and_then(|n| n.outputs.first()).map(|p| p.id) else {
        return Ok(Vec::new());
    };
    let consumers = graph.pin(output).map(|p| p.connected.clone()).unwrap_or_default();
    graph.push_output(output);

    for pin in &consumers {
        resources::apply_input(graph, device, *pin)?;
    }
    tracing::trace!(node = %node_id, texture = texture.0, consumers = consumers.len(), "Rebound output");
    Ok(consumers)
}
