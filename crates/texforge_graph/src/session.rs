// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session files: the graph, its literals and the canvas view, stored as RON.
//!
//! Loading never touches the live graph. [`Session::stage`] rebuilds the
//! whole file into a fresh [`Graph`] and releases everything it allocated if
//! any record is rejected, so a bad file leaves the caller's graph as it was.

use crate::device::Device;
use crate::error::SessionError;
use crate::graph::Graph;
use crate::node::{NodeId, NodeRegistry};
use crate::resources::{self, ResourceRegistry};
use crate::validation;
use crate::value::{Gradient, GradientStop, PinValue};
use crate::view::ViewState;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current session format version
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Session file extension
pub const SESSION_EXTENSION: &str = "tfs";

/// Persisted form of an input literal.
///
/// Texture slots are not persisted; override inputs keep their scalar or
/// color part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedValue {
    /// Integer
    Int(i32),
    /// Float, or the scalar part of a float override
    Float(f32),
    /// Boolean
    Bool(bool),
    /// Enum option index
    Enum(u32),
    /// Color, or the color part of a color override
    Color([f32; 4]),
    /// Gradient stops
    Gradient(Vec<GradientStop>),
}

impl SavedValue {
    /// Persisted form of a literal, `None` for texture pins
    pub fn from_literal(value: &PinValue) -> Option<Self> {
        match value {
            PinValue::Int(v) => Some(Self::Int(*v)),
            PinValue::Float(v) => Some(Self::Float(*v)),
            PinValue::Bool(v) => Some(Self::Bool(*v)),
            PinValue::Enum(v) => Some(Self::Enum(*v)),
            PinValue::Color(c) => Some(Self::Color(*c)),
            PinValue::Texture(_) => None,
            PinValue::FloatOrTexture { value, .. } => Some(Self::Float(*value)),
            PinValue::ColorOrTexture { color, .. } => Some(Self::Color(*color)),
            PinValue::Gradient(g) => Some(Self::Gradient(g.stops().to_vec())),
        }
    }

    /// Rebuild a literal shaped like `current`, or `None` on a type mismatch
    pub fn restore(&self, current: &PinValue) -> Option<PinValue> {
        match (self, current) {
            (Self::Int(v), PinValue::Int(_)) => Some(PinValue::Int(*v)),
            (Self::Float(v), PinValue::Float(_)) => Some(PinValue::Float(*v)),
            (Self::Bool(v), PinValue::Bool(_)) => Some(PinValue::Bool(*v)),
            (Self::Enum(v), PinValue::Enum(_)) => Some(PinValue::Enum(*v)),
            (Self::Color(c), PinValue::Color(_)) => Some(PinValue::Color(*c)),
            (Self::Float(v), PinValue::FloatOrTexture { .. }) => Some(PinValue::FloatOrTexture {
                value: *v,
                texture: None,
            }),
            (Self::Color(c), PinValue::ColorOrTexture { .. }) => Some(PinValue::ColorOrTexture {
                color: *c,
                texture: None,
            }),
            (Self::Gradient(stops), PinValue::Gradient(old)) => {
                let mut gradient = Gradient::new(stops.clone());
                gradient.ramp = old.ramp;
                Some(PinValue::Gradient(gradient))
            }
            _ => None,
        }
    }
}

/// A node in a session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Catalog position of the node type
    pub type_tag: usize,
    /// Input literals in slot order
    pub inputs: Vec<Option<SavedValue>>,
    /// Canvas position
    #[serde(default)]
    pub position: [f32; 2],
}

/// A link in a session file, by node index and pin slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Producing node index
    pub start_node: usize,
    /// Output slot on the producer
    pub start_pin: usize,
    /// Consuming node index
    pub end_node: usize,
    /// Input slot on the consumer
    pub end_pin: usize,
}

/// Canvas view in a session file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRecord {
    /// Pan offset
    pub pan: [f32; 2],
    /// Zoom factor
    pub zoom: f32,
}

impl Default for ViewRecord {
    fn default() -> Self {
        Self {
            pan: [0.0, 0.0],
            zoom: 1.0,
        }
    }
}

impl From<&ViewState> for ViewRecord {
    fn from(view: &ViewState) -> Self {
        Self {
            pan: [view.pan.x, view.pan.y],
            zoom: view.zoom,
        }
    }
}

impl From<ViewRecord> for ViewState {
    fn from(record: ViewRecord) -> Self {
        ViewState::from_parts(record.pan, record.zoom)
    }
}

/// Complete session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session format version
    pub version: u32,
    /// Nodes in index order
    pub nodes: Vec<NodeRecord>,
    /// Links in creation order
    pub links: Vec<LinkRecord>,
    /// Canvas view
    #[serde(default)]
    pub view: ViewRecord,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            nodes: Vec::new(),
            links: Vec::new(),
            view: ViewRecord::default(),
        }
    }
}

impl Session {
    /// Snapshot a graph and view
    pub fn capture(graph: &Graph, view: &ViewState) -> Self {
        let nodes = graph
            .nodes()
            .map(|node| NodeRecord {
                type_tag: node.type_tag,
                inputs: node
                    .inputs
                    .iter()
                    .map(|pin| SavedValue::from_literal(&pin.literal))
                    .collect(),
                position: node.position,
            })
            .collect();

        let links = graph
            .links()
            .filter_map(|link| {
                let start = graph.pin_address(link.start)?;
                let end = graph.pin_address(link.end)?;
                Some(LinkRecord {
                    start_node: graph.node_index(start.node)?,
                    start_pin: start.slot,
                    end_node: graph.node_index(end.node)?,
                    end_pin: end.slot,
                })
            })
            .collect();

        Self {
            version: SESSION_FORMAT_VERSION,
            nodes,
            links,
            view: ViewRecord::from(view),
        }
    }

    /// Parse a session from RON text
    pub fn from_ron(content: &str) -> Result<Self, SessionError> {
        let session: Session = ron::from_str(content)?;
        if session.version > SESSION_FORMAT_VERSION {
            return Err(SessionError::UnsupportedVersion {
                found: session.version,
                supported: SESSION_FORMAT_VERSION,
            });
        }
        Ok(session)
    }

    /// Render the session as pretty RON
    pub fn to_ron(&self) -> Result<String, SessionError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load a session file
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = std::fs::read_to_string(path)?;
        let session = Self::from_ron(&content)?;
        tracing::info!(
            path = %path.display(),
            nodes = session.nodes.len(),
            links = session.links.len(),
            "Read session"
        );
        Ok(session)
    }

    /// Save to a session file
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        std::fs::write(path, self.to_ron()?)?;
        tracing::info!(path = %path.display(), nodes = self.nodes.len(), "Saved session");
        Ok(())
    }

    /// Build the session into a new graph.
    ///
    /// On error every resource allocated for the staged graph is released.
    pub fn stage(
        &self,
        device: &mut dyn Device,
        catalog: &NodeRegistry,
        kernels: &ResourceRegistry,
    ) -> Result<Graph, SessionError> {
        let mut graph = Graph::new();
        match self.build(&mut graph, device, catalog, kernels) {
            Ok(()) => Ok(graph),
            Err(err) => {
                for node in graph.clear() {
                    resources::release(device, &node);
                }
                tracing::warn!(error = %err, "Discarded staged session");
                Err(err)
            }
        }
    }

    fn build(
        &self,
        graph: &mut Graph,
        device: &mut dyn Device,
        catalog: &NodeRegistry,
        kernels: &ResourceRegistry,
    ) -> Result<(), SessionError> {
        let mut ids: Vec<NodeId> = Vec::with_capacity(self.nodes.len());
        for (index, record) in self.nodes.iter().enumerate() {
            let node_type = catalog
                .get_by_tag(record.type_tag)
                .ok_or(SessionError::UnknownNodeType {
                    index,
                    type_tag: record.type_tag,
                })?;
            if record.inputs.len() != node_type.inputs.len() {
                return Err(SessionError::InputMismatch {
                    index,
                    input: record.inputs.len().min(node_type.inputs.len()),
                });
            }

            let payload = kernels.instantiate(device, node_type)?;
            let id = graph.add_node(node_type, record.type_tag, payload);
            ids.push(id);

            let node = graph.node_mut(id).ok_or(SessionError::InputMismatch { index, input: 0 })?;
            node.position = record.position;
            for (slot, saved) in record.inputs.iter().enumerate() {
                let Some(saved) = saved else {
                    continue;
                };
                let pin = &mut node.inputs[slot];
                let literal = saved
                    .restore(&pin.literal)
                    .ok_or(SessionError::InputMismatch { index, input: slot })?;
                pin.value = literal.clone();
                pin.literal = literal;
            }
            resources::publish_output(node);
            resources::upload_gradients(device, node)?;
        }

        for (index, record) in self.links.iter().enumerate() {
            let invalid = |reason: String| SessionError::InvalidLink { index, reason };
            let start = ids
                .get(record.start_node)
                .and_then(|id| graph.node(*id))
                .and_then(|n| n.output(record.start_pin))
                .map(|p| p.id)
                .ok_or_else(|| invalid("start pin out of range".to_string()))?;
            let end = ids
                .get(record.end_node)
                .and_then(|id| graph.node(*id))
                .and_then(|n| n.input(record.end_pin))
                .map(|p| p.id)
                .ok_or_else(|| invalid("end pin out of range".to_string()))?;

            graph.connect(start, end).map_err(|e| invalid(e.to_string()))?;
            validation::renegotiate_format(graph, device, end)?;
        }

        for node in graph.nodes() {
            resources::sync_node(device, node)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard_catalog;
    use crate::device::ImageFormat;
    use crate::headless::HeadlessDevice;

    struct Setup {
        device: HeadlessDevice,
        catalog: NodeRegistry,
        kernels: ResourceRegistry,
    }

    fn setup() -> Setup {
        let mut device = HeadlessDevice::new();
        let catalog = standard_catalog();
        let kernels = ResourceRegistry::new(&mut device, &catalog, ImageFormat::Rgba8Unorm, 32).unwrap();
        Setup {
            device,
            catalog,
            kernels,
        }
    }

    fn record(catalog: &NodeRegistry, id: &str, inputs: Vec<Option<SavedValue>>) -> NodeRecord {
        NodeRecord {
            type_tag: catalog.tag_of(id).unwrap(),
            inputs,
            position: [0.0, 0.0],
        }
    }

    fn sample(catalog: &NodeRegistry) -> Session {
        Session {
            nodes: vec![
                record(catalog, "float", vec![Some(SavedValue::Float(0.25))]),
                record(catalog, "perlin_noise", vec![None, None, Some(SavedValue::Int(7))]),
                record(
                    catalog,
                    "brightness_contrast",
                    vec![None, Some(SavedValue::Float(0.1)), None],
                ),
            ],
            links: vec![
                LinkRecord {
                    start_node: 1,
                    start_pin: 0,
                    end_node: 2,
                    end_pin: 0,
                },
                LinkRecord {
                    start_node: 0,
                    start_pin: 0,
                    end_node: 2,
                    end_pin: 1,
                },
            ],
            view: ViewRecord {
                pan: [4.0, 2.0],
                zoom: 1.5,
            },
            ..Default::default()
        }
    }

    #[test]
    fn saved_values_keep_scalar_part() {
        let value = PinValue::FloatOrTexture {
            value: 0.4,
            texture: Some(crate::device::TextureHandle(3)),
        };
        assert_eq!(SavedValue::from_literal(&value), Some(SavedValue::Float(0.4)));
        assert_eq!(SavedValue::from_literal(&PinValue::Texture(None)), None);
        assert_eq!(SavedValue::Bool(true).restore(&PinValue::Float(0.0)), None);
    }

    #[test]
    fn stage_then_capture_reproduces_records() {
        let mut s = setup();
        let session = sample(&s.catalog);
        let graph = session.stage(&mut s.device, &s.catalog, &s.kernels).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.link_count(), 2);

        let view = ViewState::from(session.view);
        let captured = Session::capture(&graph, &view);
        assert_eq!(captured.links, session.links);
        assert_eq!(captured.view, session.view);
        assert_eq!(captured.nodes[0].inputs, session.nodes[0].inputs);
        assert_eq!(captured.nodes[1].inputs[2], Some(SavedValue::Int(7)));
    }

    #[test]
    fn ron_round_trip() {
        let s = setup();
        let session = sample(&s.catalog);
        let text = session.to_ron().unwrap();
        assert_eq!(Session::from_ron(&text).unwrap(), session);
    }

    #[test]
    fn newer_version_rejected() {
        let text = "(version: 42, nodes: [], links: [])";
        assert!(matches!(
            Session::from_ron(text),
            Err(SessionError::UnsupportedVersion { found: 42, .. })
        ));
    }

    #[test]
    fn bad_records_release_staged_resources() {
        let mut s = setup();
        let baseline = s.device.live_textures();

        let mut session = sample(&s.catalog);
        session.links.push(LinkRecord {
            start_node: 2,
            start_pin: 0,
            end_node: 9,
            end_pin: 0,
        });
        assert!(matches!(
            session.stage(&mut s.device, &s.catalog, &s.kernels),
            Err(SessionError::InvalidLink { index: 2, .. })
        ));
        assert_eq!(s.device.live_textures(), baseline);

        let mut session = sample(&s.catalog);
        session.nodes.push(NodeRecord {
            type_tag: 999,
            inputs: Vec::new(),
            position: [0.0, 0.0],
        });
        assert!(matches!(
            session.stage(&mut s.device, &s.catalog, &s.kernels),
            Err(SessionError::UnknownNodeType { index: 3, type_tag: 999 })
        ));
        assert_eq!(s.device.live_textures(), baseline);
    }

    #[test]
    fn mistyped_input_is_rejected() {
        let mut s = setup();
        let mut session = sample(&s.catalog);
        session.nodes[0].inputs[0] = Some(SavedValue::Bool(true));
        assert!(matches!(
            session.stage(&mut s.device, &s.catalog, &s.kernels),
            Err(SessionError::InputMismatch { index: 0, input: 0 })
        ));
    }

    #[test]
    fn cyclic_links_are_rejected() {
        let mut s = setup();
        let mut session = sample(&s.catalog);
        let blur = record(&s.catalog, "blur", vec![None, None]);
        session.nodes.push(blur.clone());
        session.nodes.push(blur);
        session.links = vec![
            LinkRecord {
                start_node: 3,
                start_pin: 0,
                end_node: 4,
                end_pin: 0,
            },
            LinkRecord {
                start_node: 4,
                start_pin: 0,
                end_node: 3,
                end_pin: 0,
            },
        ];
        assert!(matches!(
            session.stage(&mut s.device, &s.catalog, &s.kernels),
            Err(SessionError::InvalidLink { index: 1, .. })
        ));
    }
}
