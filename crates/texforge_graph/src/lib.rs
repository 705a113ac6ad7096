// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph engine for procedural texture and material authoring.
//!
//! Nodes are small functions wired together by typed links. Value nodes run
//! on the CPU; image nodes render into device textures and coordinate with
//! each other through per-node timeline counters, so a whole recompute is a
//! single batched submission.
//!
//! ## Architecture
//!
//! - [`value`] / [`pin`]: the closed set of pin types, their values and the
//!   widening rules between them
//! - [`graph`]: nodes, pins and links with stable handles
//! - [`validation`]: the link gate and pixel format renegotiation
//! - [`schedule`]: producer-first orders for incremental and full recomputes
//! - [`execution`] / [`sync`]: one pass over a schedule and the counter protocol
//! - [`engine`]: the editing facade that ties graph, device and schedule together
//! - [`device`] / [`headless`]: the device seam and an in-memory implementation
//! - [`session`] / [`settings`]: RON persistence

pub mod catalog;
pub mod device;
pub mod engine;
pub mod error;
pub mod execution;
pub mod graph;
pub mod headless;
pub mod link;
pub mod node;
pub mod pin;
pub mod resources;
pub mod schedule;
pub mod session;
pub mod settings;
pub mod sync;
pub mod validation;
pub mod value;
pub mod view;

pub use catalog::standard_catalog;
pub use device::{Device, ImageFormat};
pub use engine::{Engine, UpdateOutcome};
pub use error::{ConnectionError, DeviceError, EngineError, SessionError, SettingsError};
pub use execution::ExecutionReport;
pub use graph::Graph;
pub use headless::HeadlessDevice;
pub use link::{Link, LinkId};
pub use node::{Node, NodeId, NodeType};
pub use pin::{Pin, PinDirection, PinId};
pub use schedule::Schedule;
pub use session::Session;
pub use settings::EngineSettings;
pub use value::{PinType, PinValue};
pub use view::ViewState;
