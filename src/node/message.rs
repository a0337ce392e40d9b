//! Protocol messages and the envelope that carries them across hops.

use super::id::NodeId;

// ── Message ───────────────────────────────────────────────────────────

/// A node-to-node protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    /// Ring election token carrying the best candidate seen so far.
    Elect { candidate: NodeId },
    /// Announcement of the elected leader, circulated once around the ring.
    Leader { leader: NodeId },
    /// Liveness probe sent by a node to its ring successor.
    FailureCheck { checker: NodeId },
    /// Reply to a `FailureCheck`, addressed back to the checker.
    FailureResponse { responder: NodeId },
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Elect { candidate } => write!(f, "elect {}", candidate.raw()),
            Message::Leader { leader } => write!(f, "leader {}", leader.raw()),
            Message::FailureCheck { checker } => write!(f, "failure_check {}", checker.raw()),
            Message::FailureResponse { responder } => {
                write!(f, "failure_response {}", responder.raw())
            }
        }
    }
}

// ── NetworkReport ─────────────────────────────────────────────────────

/// A message addressed to the network itself rather than to a node.
///
/// These never touch the bus: the controller intercepts them as soon as
/// the reporting node finishes its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum NetworkReport {
    /// The leader's own announcement made it all the way around the ring.
    LeaderElected(NodeId),
    /// The reporting node's successor stopped answering probes.
    FailedNode(NodeId),
}

impl std::fmt::Display for NetworkReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkReport::LeaderElected(id) => write!(f, "leader_elected {}", id.raw()),
            NetworkReport::FailedNode(id) => write!(f, "failed_node {}", id.raw()),
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────

/// A message tagged with its final destination.
///
/// The destination is fixed when the message is first sent. Every hop
/// compares it to its own id to decide between processing the message
/// and tunnelling it onward through its own redirection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    /// The node that created the message.
    pub origin: NodeId,
    /// The node that should process the message.
    pub destination: NodeId,
    pub message: Message,
}

impl Envelope {
    pub fn new(origin: NodeId, destination: NodeId, message: Message) -> Self {
        Envelope {
            origin,
            destination,
            message,
        }
    }

    /// Whether `node` is the intended processor of this envelope.
    #[inline]
    pub fn is_for(&self, node: NodeId) -> bool {
        self.destination == node
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` ({} → {})", self.message, self.origin, self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_display_matches_wire_names() {
        let n = NodeId::new(4);
        assert_eq!(Message::Elect { candidate: n }.to_string(), "elect 4");
        assert_eq!(Message::Leader { leader: n }.to_string(), "leader 4");
        assert_eq!(Message::FailureCheck { checker: n }.to_string(), "failure_check 4");
        assert_eq!(
            Message::FailureResponse { responder: n }.to_string(),
            "failure_response 4"
        );
        assert_eq!(NetworkReport::LeaderElected(n).to_string(), "leader_elected 4");
        assert_eq!(NetworkReport::FailedNode(n).to_string(), "failed_node 4");
    }

    #[test]
    fn test_envelope_is_for() {
        let env = Envelope::new(
            NodeId::new(1),
            NodeId::new(3),
            Message::Elect { candidate: NodeId::new(1) },
        );
        assert!(env.is_for(NodeId::new(3)));
        assert!(!env.is_for(NodeId::new(2)));
    }
}
