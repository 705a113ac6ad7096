// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline counter protocol between device nodes.
//!
//! Every image node owns a timeline semaphore. One execution of the node is
//! two device phases: the compute phase renders the output and signals
//! `observed + 1`, the make-visible phase waits for that and signals
//! `observed + 2`. Consumers wait for `observed + 2`, which is also the
//! threshold the next execution of the node compares against.

use crate::device::{SemaphoreHandle, TimelinePoint};
use crate::node::NodeId;

/// Device phases per node execution
pub const PHASES_PER_EXECUTION: u64 = 2;

/// Counter values of one node execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionToken {
    observed: u64,
    signal: u64,
    wait_threshold: u64,
}

impl CompletionToken {
    /// Arm a token from the counter value read before this execution
    pub fn arm(observed: u64) -> Self {
        let signal = observed + PHASES_PER_EXECUTION;
        Self {
            observed,
            signal,
            wait_threshold: signal,
        }
    }

    /// Counter value read when the token was armed
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Value signaled by the compute phase
    pub fn compute_signal(&self) -> u64 {
        self.observed + 1
    }

    /// Value signaled once the output is visible; what consumers wait for
    pub fn signal(&self) -> u64 {
        self.signal
    }

    /// Counter value at which this execution's output is complete
    pub fn wait_threshold(&self) -> u64 {
        self.wait_threshold
    }

    /// Whether a counter value means this execution has finished
    pub fn is_complete(&self, counter: u64) -> bool {
        counter >= self.wait_threshold
    }

    /// Point a consumer must wait on
    pub fn wait_point(&self, semaphore: SemaphoreHandle) -> TimelinePoint {
        TimelinePoint {
            semaphore,
            value: self.signal,
        }
    }
}

/// A consumer's pending wait on an upstream image node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEntry {
    /// Producing node
    pub producer: NodeId,
    /// Point to wait on
    pub point: TimelinePoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_adds_two_phases() {
        let token = CompletionToken::arm(6);
        assert_eq!(token.observed(), 6);
        assert_eq!(token.compute_signal(), 7);
        assert_eq!(token.signal(), 8);
        assert_eq!(token.wait_threshold(), 8);
    }

    #[test]
    fn completion_threshold() {
        let token = CompletionToken::arm(0);
        assert!(!token.is_complete(1));
        assert!(token.is_complete(2));
        assert!(token.is_complete(9));
        assert!(CompletionToken::default().is_complete(0));
    }

    #[test]
    fn wait_point_uses_final_signal() {
        let token = CompletionToken::arm(4);
        let point = token.wait_point(SemaphoreHandle(3));
        assert_eq!(point.semaphore, SemaphoreHandle(3));
        assert_eq!(point.value, 6);
    }
}
