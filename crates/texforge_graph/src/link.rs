// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::pin::PinId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a link, allocated from the graph's identity counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u32);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A link from an output pin to an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Link ID
    pub id: LinkId,
    /// Output pin
    pub start: PinId,
    /// Input pin
    pub end: PinId,
}

impl Link {
    /// Create a new link
    pub fn new(id: LinkId, start: PinId, end: PinId) -> Self {
        Self { id, start, end }
    }

    /// Check if this link touches a specific pin
    pub fn involves_pin(&self, pin: PinId) -> bool {
        self.start == pin || self.end == pin
    }
}
