// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency scheduling.
//!
//! Both schedules come from the same iterative depth-first walk over
//! downstream links. A node is finished once all its successors are, so the
//! post-order lists consumers before producers; reversing it yields an order
//! in which every producer precedes its consumers.

use crate::graph::Graph;
use crate::node::NodeId;

/// Nodes to process, producers first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Node handles in processing order
    pub order: Vec<NodeId>,
    /// Whether every node of the graph is included
    pub full: bool,
}

impl Schedule {
    /// Everything downstream of `root`, including `root` itself.
    ///
    /// Returns `None` if `root` is not in the graph.
    pub fn incremental(graph: &Graph, root: NodeId) -> Option<Self> {
        let start = graph.node_index(root)?;
        let mut visited = vec![false; graph.node_count()];
        let mut post_order = Vec::new();
        walk(graph, start, &mut visited, &mut post_order);

        let order = finish(graph, post_order);
        tracing::debug!(root = %root, nodes = order.len(), "Incremental schedule");
        Some(Self { order, full: false })
    }

    /// Every node of the graph
    pub fn full(graph: &Graph) -> Self {
        let mut visited = vec![false; graph.node_count()];
        let mut post_order = Vec::with_capacity(graph.node_count());
        for index in 0..graph.node_count() {
            if !visited[index] {
                walk(graph, index, &mut visited, &mut post_order);
            }
        }

        let order = finish(graph, post_order);
        tracing::debug!(nodes = order.len(), "Full schedule");
        Self { order, full: true }
    }

    /// Number of scheduled nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of a node in the schedule
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.order.iter().position(|n| *n == node)
    }
}

struct Frame {
    index: usize,
    successors: Vec<usize>,
    next: usize,
}

/// Post-order walk from `start` with an explicit frame stack
fn walk(graph: &Graph, start: usize, visited: &mut [bool], post_order: &mut Vec<usize>) {
    visited[start] = true;
    let mut stack = vec![Frame {
        index: start,
        successors: graph.successor_indices(start),
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if let Some(&successor) = frame.successors.get(frame.next) {
            frame.next += 1;
            if successor < visited.len() && !visited[successor] {
                visited[successor] = true;
                stack.push(Frame {
                    index: successor,
                    successors: graph.successor_indices(successor),
                    next: 0,
                });
            }
        } else {
            post_order.push(frame.index);
            stack.pop();
        }
    }
}

fn finish(graph: &Graph, post_order: Vec<usize>) -> Vec<NodeId> {
    post_order
        .into_iter()
        .rev()
        .filter_map(|index| graph.node_at(index).map(|n| n.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ValueOp;
    use crate::node::{NodeCategory, NodeKind, NodePayload, NodeType};
    use crate::pin::PinSchema;
    use crate::value::PinType;

    fn two_in_one_out() -> NodeType {
        NodeType {
            id: "join".to_string(),
            name: "Join".to_string(),
            category: NodeCategory::Math,
            description: String::new(),
            kind: NodeKind::Value(ValueOp::Float),
            inputs: vec![PinSchema::new("A", PinType::Float), PinSchema::new("B", PinType::Float)],
            outputs: vec![PinSchema::new("Out", PinType::Float)],
        }
    }

    fn build(count: usize, edges: &[(usize, usize, usize)]) -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new();
        let t = two_in_one_out();
        let ids: Vec<NodeId> = (0..count)
            .map(|_| graph.add_node(&t, 0, NodePayload::Value(ValueOp::Float)))
            .collect();
        for &(from, to, slot) in edges {
            let start = graph.node(ids[from]).unwrap().outputs[0].id;
            let end = graph.node(ids[to]).unwrap().inputs[slot].id;
            graph.connect(start, end).unwrap();
        }
        (graph, ids)
    }

    fn assert_sound(graph: &Graph, schedule: &Schedule) {
        for link in graph.links() {
            let producer = graph.owner(link.start).unwrap();
            let consumer = graph.owner(link.end).unwrap();
            if let (Some(p), Some(c)) = (schedule.position(producer), schedule.position(consumer)) {
                assert!(p < c, "producer scheduled after consumer");
            }
        }
    }

    #[test]
    fn chain_from_root() {
        let (graph, ids) = build(3, &[(0, 1, 0), (1, 2, 0)]);
        let schedule = Schedule::incremental(&graph, ids[0]).unwrap();
        assert_eq!(schedule.order, ids);
        assert!(!schedule.full);
    }

    #[test]
    fn incremental_covers_only_downstream() {
        // 0 -> 1 -> 3, 2 -> 3
        let (graph, ids) = build(4, &[(0, 1, 0), (1, 3, 0), (2, 3, 1)]);
        let schedule = Schedule::incremental(&graph, ids[1]).unwrap();
        assert_eq!(schedule.order, vec![ids[1], ids[3]]);
    }

    #[test]
    fn diamond_is_sound_and_visits_once() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let (graph, ids) = build(4, &[(0, 1, 0), (0, 2, 0), (1, 3, 0), (2, 3, 1)]);
        let schedule = Schedule::incremental(&graph, ids[0]).unwrap();
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.order[0], ids[0]);
        assert_eq!(schedule.order[3], ids[3]);
        assert_sound(&graph, &schedule);
    }

    #[test]
    fn full_covers_every_node_once() {
        // Consumer added before its producer, plus an isolated node.
        let (graph, ids) = build(5, &[(3, 0, 0), (0, 1, 0), (2, 1, 1)]);
        let schedule = Schedule::full(&graph);
        assert!(schedule.full);
        assert_eq!(schedule.len(), 5);
        for id in &ids {
            assert_eq!(schedule.order.iter().filter(|n| *n == id).count(), 1);
        }
        assert_sound(&graph, &schedule);
    }

    #[test]
    fn schedules_are_deterministic() {
        let (graph, ids) = build(6, &[(0, 1, 0), (0, 2, 0), (1, 3, 0), (2, 3, 1), (4, 5, 0)]);
        assert_eq!(Schedule::full(&graph), Schedule::full(&graph));
        assert_eq!(
            Schedule::incremental(&graph, ids[0]),
            Schedule::incremental(&graph, ids[0])
        );
    }

    #[test]
    fn unknown_root() {
        let (graph, _) = build(1, &[]);
        assert!(Schedule::incremental(&graph, NodeId::new()).is_none());
        assert!(Schedule::full(&Graph::new()).is_empty());
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let edges: Vec<(usize, usize, usize)> = (0..2_000).map(|i| (i, i + 1, 0)).collect();
        let (graph, ids) = build(2_001, &edges);
        let schedule = Schedule::incremental(&graph, ids[0]).unwrap();
        assert_eq!(schedule.order, ids);
    }
}
