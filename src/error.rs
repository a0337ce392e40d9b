//! Structured error types for ringnet.
//!
//! All fallible public APIs return `Result<T, RingError>`. Input problems
//! (bad graph or schedule text, unreadable files) are the only hard
//! errors; protocol-level trouble such as a disconnected ring is reported
//! through the simulation outcome instead.

use thiserror::Error;

use crate::node::NodeId;

/// The top-level error type for the ring simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    // ── Topology errors ───────────────────────────────────

    /// The adjacency description declared no nodes.
    #[error("topology has no nodes")]
    EmptyTopology,

    /// The same node id heads two adjacency lines.
    #[error("node {0} is declared more than once")]
    DuplicateNode(NodeId),

    /// A node id was referenced but never declared.
    #[error("node {0} is not part of the topology")]
    UnknownNode(NodeId),

    // ── Input errors ──────────────────────────────────────

    /// A line of the adjacency description could not be parsed.
    #[error("graph line {line}: {reason}")]
    MalformedGraph { line: usize, reason: String },

    /// A line of the schedule description could not be parsed.
    #[error("schedule line {line}: {reason}")]
    MalformedSchedule { line: usize, reason: String },

    /// An input file could not be read.
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
}

/// Convenience alias for `Result<T, RingError>`.
pub type RingResult<T> = Result<T, RingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_node() {
        let e = RingError::UnknownNode(NodeId::new(5));
        assert_eq!(e.to_string(), "node N5 is not part of the topology");
    }

    #[test]
    fn test_error_display_malformed_schedule() {
        let e = RingError::MalformedSchedule {
            line: 3,
            reason: "expected a round number".into(),
        };
        assert_eq!(e.to_string(), "schedule line 3: expected a round number");
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(RingError::EmptyTopology);
        assert!(!e.to_string().is_empty());
    }
}
