//! Per-node failure detector monitoring the ring successor.
//!
//! The detector is a two-state machine driven once per round:
//!
//! ```text
//!   Idle ──(since_last_success > T)──▶ Waiting ──(since_probe_sent > 2·D)──▶ suspect
//!    ▲                                    │
//!    └──────────(matching response)───────┘
//! ```

use super::id::NodeId;

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DetectorState {
    Idle,
    /// A probe is outstanding against `target`.
    Waiting { target: NodeId },
}

/// What the owning node has to do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorAction {
    None,
    /// Send `failure_check` to this node.
    Probe(NodeId),
    /// This node missed its response window.
    Suspect(NodeId),
}

#[derive(Debug, Clone)]
pub struct FailureDetector {
    probe_interval: u64,
    round_trip: u64,
    state: DetectorState,
    since_last_success: u64,
    since_probe_sent: u64,
}

impl FailureDetector {
    /// `probe_interval` is `T`, the idle rounds before probing.
    /// `round_trip` is `D`, the expected round-trip bound; the successor
    /// is suspected once `2 * D` rounds pass without a reply.
    pub fn new(probe_interval: u64, round_trip: u64) -> Self {
        FailureDetector {
            probe_interval,
            round_trip,
            state: DetectorState::Idle,
            since_last_success: 0,
            since_probe_sent: 0,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn since_last_success(&self) -> u64 {
        self.since_last_success
    }

    pub fn since_probe_sent(&self) -> u64 {
        self.since_probe_sent
    }

    /// The node currently being probed, if any.
    pub fn probing(&self) -> Option<NodeId> {
        match self.state {
            DetectorState::Idle => None,
            DetectorState::Waiting { target } => Some(target),
        }
    }

    /// Advance one round. `successor` is the node to probe if a new probe
    /// goes out this round.
    pub fn tick(&mut self, successor: NodeId) -> DetectorAction {
        match self.state {
            DetectorState::Idle => {
                self.since_last_success += 1;
                if self.since_last_success > self.probe_interval {
                    self.state = DetectorState::Waiting { target: successor };
                    self.since_probe_sent = 0;
                    DetectorAction::Probe(successor)
                } else {
                    DetectorAction::None
                }
            }
            DetectorState::Waiting { target } => {
                self.since_probe_sent += 1;
                if self.since_probe_sent > self.round_trip.saturating_mul(2) {
                    self.reset();
                    DetectorAction::Suspect(target)
                } else {
                    DetectorAction::None
                }
            }
        }
    }

    /// Feed a `failure_response`. Returns `true` if it answered the
    /// outstanding probe; stale or foreign responses are ignored.
    pub fn on_response(&mut self, responder: NodeId) -> bool {
        if self.probing() == Some(responder) {
            self.reset();
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.since_last_success = 0;
        self.since_probe_sent = 0;
    }
}
