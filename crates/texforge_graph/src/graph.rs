// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and links.
//!
//! Nodes live in an insertion-ordered map keyed by their stable [`NodeId`].
//! A node's *index* is its position in that map; removing a node shifts
//! every later node down by one, while pins keep referring to their owner by
//! handle, so no back-reference ever needs renumbering.

use crate::error::ConnectionError;
use crate::link::{Link, LinkId};
use crate::node::{Node, NodeId, NodePayload, NodeType};
use crate::pin::{Pin, PinAddress, PinDirection, PinId};
use crate::validation;
use crate::value::PinValue;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Outcome of a successful connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connected {
    /// The new link
    pub link: LinkId,
    /// Link that previously fed the input, now removed
    pub evicted: Option<Link>,
}

/// A node taken out of the graph together with its links
#[derive(Debug)]
pub struct RemovedNode {
    /// The node as it was
    pub node: Node,
    /// Index it had before removal
    pub index: usize,
    /// Links that touched it
    pub links: Vec<Link>,
    /// Inputs of other nodes that lost their producer
    pub orphaned_inputs: Vec<PinId>,
}

/// A node graph
#[derive(Debug, Default)]
pub struct Graph {
    /// Nodes in index order
    nodes: IndexMap<NodeId, Node>,
    /// Links in creation order
    links: IndexMap<LinkId, Link>,
    /// Location of every pin
    pins: HashMap<PinId, PinAddress>,
    /// Last identity handed out for a pin or link
    next_id: u32,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Append a node built from a type's pin schema
    pub fn add_node(&mut self, node_type: &NodeType, type_tag: usize, payload: NodePayload) -> NodeId {
        let id = NodeId::new();

        let mut inputs = Vec::with_capacity(node_type.inputs.len());
        for (slot, schema) in node_type.inputs.iter().enumerate() {
            let pin_id = PinId(self.allocate_id());
            self.pins.insert(
                pin_id,
                PinAddress {
                    node: id,
                    direction: PinDirection::Input,
                    slot,
                },
            );
            inputs.push(Pin::from_schema(pin_id, id, schema, PinDirection::Input));
        }

        let mut outputs = Vec::with_capacity(node_type.outputs.len());
        for (slot, schema) in node_type.outputs.iter().enumerate() {
            let pin_id = PinId(self.allocate_id());
            self.pins.insert(
                pin_id,
                PinAddress {
                    node: id,
                    direction: PinDirection::Output,
                    slot,
                },
            );
            outputs.push(Pin::from_schema(pin_id, id, schema, PinDirection::Output));
        }

        let node = Node {
            id,
            type_tag,
            label: node_type.name.clone(),
            position: [0.0, 0.0],
            inputs,
            outputs,
            payload,
        };
        self.nodes.insert(id, node);
        tracing::debug!(node = %id, kind = %node_type.id, index = self.nodes.len() - 1, "Added node");
        id
    }

    /// Remove a node and every link touching it.
    ///
    /// Later nodes shift down one index. Inputs that were fed by the node
    /// get their literal back. Returns `None` for an unknown node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<RemovedNode> {
        let index = self.nodes.get_index_of(&node_id)?;

        let touching: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| self.owner(l.start) == Some(node_id) || self.owner(l.end) == Some(node_id))
            .map(|l| l.id)
            .collect();

        let mut links = Vec::with_capacity(touching.len());
        let mut orphaned_inputs = Vec::new();
        for link_id in touching {
            if let Some(link) = self.disconnect(link_id) {
                if self.owner(link.end) != Some(node_id) {
                    orphaned_inputs.push(link.end);
                }
                links.push(link);
            }
        }

        let node = self.nodes.shift_remove(&node_id)?;
        for pin in node.pins() {
            self.pins.remove(&pin.id);
        }

        tracing::debug!(node = %node_id, index, links = links.len(), "Removed node");
        Some(RemovedNode {
            node,
            index,
            links,
            orphaned_inputs,
        })
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get a node by index
    pub fn node_at(&self, index: usize) -> Option<&Node> {
        self.nodes.get_index(index).map(|(_, n)| n)
    }

    /// Current index of a node
    pub fn node_index(&self, node_id: NodeId) -> Option<usize> {
        self.nodes.get_index_of(&node_id)
    }

    /// Get all nodes in index order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs in index order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Where a pin lives
    pub fn pin_address(&self, pin_id: PinId) -> Option<PinAddress> {
        self.pins.get(&pin_id).copied()
    }

    /// Node owning a pin
    pub fn owner(&self, pin_id: PinId) -> Option<NodeId> {
        self.pins.get(&pin_id).map(|a| a.node)
    }

    /// Get a pin by ID
    pub fn pin(&self, pin_id: PinId) -> Option<&Pin> {
        let address = self.pins.get(&pin_id)?;
        let node = self.nodes.get(&address.node)?;
        match address.direction {
            PinDirection::Input => node.inputs.get(address.slot),
            PinDirection::Output => node.outputs.get(address.slot),
        }
    }

    /// Get a mutable pin by ID
    pub fn pin_mut(&mut self, pin_id: PinId) -> Option<&mut Pin> {
        let address = *self.pins.get(&pin_id)?;
        let node = self.nodes.get_mut(&address.node)?;
        match address.direction {
            PinDirection::Input => node.inputs.get_mut(address.slot),
            PinDirection::Output => node.outputs.get_mut(address.slot),
        }
    }

    /// Link an output pin to an input pin.
    ///
    /// A link already feeding `end` is evicted first and its input gets its
    /// literal back; then the producer's cached value is pushed into `end`.
    pub fn connect(&mut self, start: PinId, end: PinId) -> Result<Connected, ConnectionError> {
        validation::is_pin_connection_valid(self, start, end)?;

        let evicted = match self.link_into(end).map(|l| l.id) {
            Some(old) => self.disconnect(old),
            None => None,
        };

        let id = LinkId(self.allocate_id());
        self.links.insert(id, Link::new(id, start, end));

        let value = match self.pin_mut(start) {
            Some(pin) => {
                pin.connected.push(end);
                pin.value.clone()
            }
            None => return Err(ConnectionError::PinNotFound(start)),
        };
        let consumer = self.pin_mut(end).ok_or(ConnectionError::PinNotFound(end))?;
        consumer.connected.push(start);
        if let Some(widened) = value.widen_into(&consumer.value) {
            consumer.value = widened;
        }

        tracing::debug!(link = %id, %start, %end, evicted = evicted.is_some(), "Connected pins");
        Ok(Connected { link: id, evicted })
    }

    /// Remove a link, restoring the input's literal
    pub fn disconnect(&mut self, link_id: LinkId) -> Option<Link> {
        let link = self.links.shift_remove(&link_id)?;
        if let Some(start) = self.pin_mut(link.start) {
            start.forget(link.end);
        }
        if let Some(end) = self.pin_mut(link.end) {
            end.forget(link.start);
            end.restore_literal();
        }
        Some(link)
    }

    /// Get a link by ID
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// Get all links
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Link feeding an input pin
    pub fn link_into(&self, pin_id: PinId) -> Option<&Link> {
        self.links.values().find(|l| l.end == pin_id)
    }

    /// Inputs fed by a node's outputs, in output then link order
    pub fn consumers(&self, node_id: NodeId) -> Vec<PinId> {
        self.nodes
            .get(&node_id)
            .map(|node| {
                node.outputs
                    .iter()
                    .flat_map(|out| out.connected.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Indices of nodes fed by the node at `index`, in exploration order
    pub fn successor_indices(&self, index: usize) -> Vec<usize> {
        let Some((_, node)) = self.nodes.get_index(index) else {
            return Vec::new();
        };
        node.outputs
            .iter()
            .flat_map(|out| out.connected.iter())
            .filter_map(|pin| self.owner(*pin))
            .filter_map(|owner| self.nodes.get_index_of(&owner))
            .collect()
    }

    /// Whether `to` is reachable from `from` by following links downstream
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let Some(start) = self.node_index(from) else {
            return false;
        };
        let Some(target) = self.node_index(to) else {
            return false;
        };

        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            if index == target {
                return true;
            }
            if seen.insert(index) {
                stack.extend(self.successor_indices(index));
            }
        }
        false
    }

    /// Value an input pin currently sees.
    ///
    /// A linked input reads its producer's cached output widened to the
    /// input's type; an unlinked one reads its own value.
    pub fn effective_input(&self, pin_id: PinId) -> Option<PinValue> {
        let pin = self.pin(pin_id)?;
        if pin.direction == PinDirection::Input {
            if let Some(producer) = self.link_into(pin_id).and_then(|l| self.pin(l.start)) {
                if let Some(value) = producer.value.widen_into(&pin.value) {
                    return Some(value);
                }
            }
        }
        Some(pin.value.clone())
    }

    /// Effective values of a node's inputs in slot order
    pub fn input_values(&self, node_id: NodeId) -> Vec<PinValue> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Vec::new();
        };
        node.inputs
            .iter()
            .map(|pin| self.effective_input(pin.id).unwrap_or_else(|| pin.value.clone()))
            .collect()
    }

    /// Push an output pin's cached value into every input it feeds.
    ///
    /// Returns the inputs that changed.
    pub fn push_output(&mut self, output: PinId) -> Vec<PinId> {
        let Some((value, targets)) = self
            .pin(output)
            .map(|p| (p.value.clone(), p.connected.clone()))
        else {
            return Vec::new();
        };

        let mut changed = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(pin) = self.pin_mut(target) {
                if let Some(widened) = value.widen_into(&pin.value) {
                    if widened != pin.value {
                        pin.value = widened;
                        changed.push(target);
                    }
                }
            }
        }
        changed
    }

    /// Set an input's literal; the live value follows unless a link drives it
    pub fn set_literal(&mut self, pin_id: PinId, value: PinValue) -> bool {
        let Some(pin) = self.pin_mut(pin_id) else {
            return false;
        };
        if !pin.is_connected() {
            pin.value = value.clone();
        }
        pin.literal = value;
        true
    }

    /// Move a node in the editor
    pub fn set_position(&mut self, node_id: NodeId, position: [f32; 2]) -> bool {
        match self.nodes.get_mut(&node_id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    /// Drop every node and link; identities keep counting up
    pub fn clear(&mut self) -> Vec<Node> {
        self.links.clear();
        self.pins.clear();
        self.nodes.drain(..).map(|(_, n)| n).collect()
    }
}
