// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for graph editing, device work and persistence.

use crate::device::SemaphoreHandle;
use crate::link::LinkId;
use crate::node::NodeId;
use crate::pin::PinId;
use crate::value::PinType;
use std::time::Duration;
use thiserror::Error;

/// Error when creating a link
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Pin not found
    #[error("Pin not found: {0}")]
    PinNotFound(PinId),

    /// Link not found
    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),

    /// Start pin is not an output or end pin is not an input
    #[error("Links must run from an output pin to an input pin")]
    DirectionMismatch,

    /// Both pins belong to the same node
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// Incompatible pin types
    #[error("Incompatible pin types: {from:?} -> {to:?}")]
    IncompatibleTypes {
        /// Output pin type
        from: PinType,
        /// Input pin type
        to: PinType,
    },

    /// The link would close a cycle
    #[error("Link would create a cycle through node {0}")]
    WouldCreateCycle(NodeId),
}

/// Errors reported by a device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Resource allocation failed
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// Submission was rejected
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// A submission waits on a value its semaphore can never reach in this batch
    #[error("Submission '{label}' waits on {semaphore:?} >= {value} but it is at {current}")]
    UnsatisfiedWait {
        /// Label of the waiting submission
        label: String,
        /// Semaphore waited on
        semaphore: SemaphoreHandle,
        /// Threshold
        value: u64,
        /// Counter value at that point of the batch
        current: u64,
    },

    /// Waiting for the completion fence took too long
    #[error("Timed out after {0:?} waiting for the device")]
    Timeout(Duration),

    /// A handle that the device does not know
    #[error("Unknown device handle: {0}")]
    UnknownHandle(u64),
}

/// Result type for device operations
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Errors when reading or writing session files
#[derive(Debug, Error)]
pub enum SessionError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed file
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// File written by a newer version
    #[error("Session version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest supported version
        supported: u32,
    },

    /// Node record with a type tag outside the catalog
    #[error("Node {index} has unknown type tag {type_tag}")]
    UnknownNodeType {
        /// Record index
        index: usize,
        /// Offending tag
        type_tag: usize,
    },

    /// Node record whose inputs do not match its type
    #[error("Node {index}: input {input} does not match its declared type")]
    InputMismatch {
        /// Record index
        index: usize,
        /// Input slot
        input: usize,
    },

    /// Link record pointing outside the graph or rejected by validation
    #[error("Link {index} is invalid: {reason}")]
    InvalidLink {
        /// Record index
        index: usize,
        /// Why it was rejected
        reason: String,
    },

    /// Device failure while staging the loaded graph
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// Errors when reading or writing settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed file
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// File written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest supported version
        supported: u32,
    },
}

/// Errors surfaced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Node not found
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    /// Node type tag not in the catalog
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Pin not found
    #[error("Pin not found: {0}")]
    UnknownPin(PinId),

    /// Value of the wrong type for a pin
    #[error("Pin {pin} expects {expected:?}, got {found:?}")]
    ValueTypeMismatch {
        /// Target pin
        pin: PinId,
        /// Pin type
        expected: PinType,
        /// Value type
        found: PinType,
    },

    /// Widget edit on an input that is driven by a link
    #[error("Pin {0} is driven by a link")]
    InputConnected(PinId),

    /// A previous device failure left the graph out of date
    #[error("Graph is stale after a device failure: {0}")]
    Stale(String),

    /// Link rejected
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Device failure
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Session failure
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
