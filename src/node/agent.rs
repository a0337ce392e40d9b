//! `RingNode`, the per-node election and failure-detection state machine.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, trace, warn};

use super::detector::{DetectorAction, FailureDetector};
use super::id::NodeId;
use super::message::{Envelope, Message, NetworkReport};

// ── Router ────────────────────────────────────────────────────────────

/// Read-only routing queries a node may make while stepping.
///
/// Nodes never see the redirection tables directly; the topology owner
/// answers these questions and stays the single writer of routing state.
pub trait Router {
    /// The logical ring successor of `node`.
    fn successor(&self, node: NodeId) -> Option<NodeId>;

    /// The physical neighbor `from` should hand a message to so that it
    /// eventually reaches `destination`.
    fn next_hop(&self, from: NodeId, destination: NodeId) -> NodeId;
}

// ── Action / Outgoing ─────────────────────────────────────────────────

/// External action assigned to a node for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Action {
    #[default]
    None,
    StartElection,
    Fail,
}

/// Something a node wants to emit at the end of its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing {
    /// Hand `envelope` to the physical neighbor `hop`.
    Hop { hop: NodeId, envelope: Envelope },
    /// A report for the network itself; intercepted by the controller.
    Network(NetworkReport),
}

/// Coarse protocol state, derived from the node's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeState {
    NotParticipant,
    Participant,
    Leader,
    Failed,
}

// ── RingNode ──────────────────────────────────────────────────────────

/// A node taking part in the ring election.
///
/// The node owns its inbox, outbox and local view of failures. Routing
/// questions go through a [`Router`] supplied on every step.
#[derive(Debug, Clone)]
pub struct RingNode {
    id: NodeId,
    participant: bool,
    leader: Option<NodeId>,
    is_leader: bool,
    failed: bool,
    detector: FailureDetector,
    known_failed: BTreeSet<NodeId>,
    /// Set when the leader is detected as failed; the election starts on
    /// the following round, once the topology has been repaired.
    election_deferred: bool,
    inbox: VecDeque<Envelope>,
    outbox: Vec<Outgoing>,
}

impl RingNode {
    pub fn new(id: NodeId, probe_interval: u64, round_trip: u64) -> Self {
        RingNode {
            id,
            participant: false,
            leader: None,
            is_leader: false,
            failed: false,
            detector: FailureDetector::new(probe_interval, round_trip),
            known_failed: BTreeSet::new(),
            election_deferred: false,
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader && !self.failed
    }

    pub fn is_participant(&self) -> bool {
        self.participant
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn election_deferred(&self) -> bool {
        self.election_deferred
    }

    pub fn known_failed(&self) -> &BTreeSet<NodeId> {
        &self.known_failed
    }

    pub fn detector(&self) -> &FailureDetector {
        &self.detector
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    pub fn state(&self) -> NodeState {
        if self.failed {
            NodeState::Failed
        } else if self.is_leader {
            NodeState::Leader
        } else if self.participant {
            NodeState::Participant
        } else {
            NodeState::NotParticipant
        }
    }

    /// Buffer a delivered envelope. Failed nodes swallow everything.
    pub fn deliver(&mut self, envelope: Envelope) {
        if !self.failed {
            self.inbox.push_back(envelope);
        }
    }

    /// Take everything the node produced during its last step.
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Run one round of the protocol.
    pub fn step<R: Router + ?Sized>(&mut self, action: Action, router: &R) {
        if self.failed {
            return;
        }
        if action == Action::Fail {
            debug!(node = %self.id, "crashing");
            self.failed = true;
            self.participant = false;
            self.inbox.clear();
            self.outbox.clear();
            return;
        }

        let successor = router.successor(self.id);
        let resume = self.election_deferred
            && successor.is_some_and(|next| !self.known_failed.contains(&next));
        if action == Action::StartElection || resume {
            self.start_election(router);
        }

        while let Some(envelope) = self.inbox.pop_front() {
            if envelope.is_for(self.id) {
                self.handle(envelope.message, router);
            } else {
                self.forward(envelope, router);
            }
        }

        self.tick_detector(router);
    }

    fn start_election<R: Router + ?Sized>(&mut self, router: &R) {
        debug!(node = %self.id, "starting election");
        self.election_deferred = false;
        self.participant = true;
        self.send_to_successor(Message::Elect { candidate: self.id }, router);
    }

    fn handle<R: Router + ?Sized>(&mut self, message: Message, router: &R) {
        trace!(node = %self.id, %message, "processing");
        match message {
            Message::Elect { candidate } => self.on_elect(candidate, router),
            Message::Leader { leader } => self.on_leader(leader, router),
            Message::FailureCheck { checker } => {
                self.send(checker, Message::FailureResponse { responder: self.id }, router);
            }
            Message::FailureResponse { responder } => {
                self.detector.on_response(responder);
            }
        }
    }

    fn on_elect<R: Router + ?Sized>(&mut self, candidate: NodeId, router: &R) {
        if !self.participant {
            self.participant = true;
            let best = candidate.max(self.id);
            self.send_to_successor(Message::Elect { candidate: best }, router);
        } else if candidate > self.id {
            self.send_to_successor(Message::Elect { candidate }, router);
        } else if candidate == self.id {
            debug!(node = %self.id, "won election");
            self.is_leader = true;
            self.leader = Some(self.id);
            self.send_to_successor(Message::Leader { leader: self.id }, router);
        } else {
            trace!(node = %self.id, %candidate, "suppressing weaker candidate");
        }
    }

    fn on_leader<R: Router + ?Sized>(&mut self, leader: NodeId, router: &R) {
        if leader == self.id && self.leader == Some(self.id) {
            // Our own announcement came back around the ring.
            self.participant = false;
            self.outbox
                .push(Outgoing::Network(NetworkReport::LeaderElected(self.id)));
            return;
        }
        if self.leader == Some(leader) {
            // Already known: the lap ends here. Leaving the participant
            // state lets a later election through.
            trace!(node = %self.id, %leader, "leader already known");
            self.participant = false;
            return;
        }
        debug!(node = %self.id, %leader, "adopting leader");
        self.leader = Some(leader);
        self.is_leader = leader == self.id;
        self.participant = false;
        self.send_to_successor(Message::Leader { leader }, router);
    }

    fn tick_detector<R: Router + ?Sized>(&mut self, router: &R) {
        let Some(successor) = router.successor(self.id) else {
            return;
        };
        match self.detector.tick(successor) {
            DetectorAction::None => {}
            DetectorAction::Probe(target) => {
                self.send(target, Message::FailureCheck { checker: self.id }, router);
            }
            DetectorAction::Suspect(target) => {
                warn!(node = %self.id, suspect = %target, "successor missed its probe window");
                self.known_failed.insert(target);
                self.outbox
                    .push(Outgoing::Network(NetworkReport::FailedNode(target)));
                if self.leader == Some(target) {
                    self.election_deferred = true;
                }
            }
        }
    }

    fn send_to_successor<R: Router + ?Sized>(&mut self, message: Message, router: &R) {
        match router.successor(self.id) {
            Some(next) => self.send(next, message, router),
            None => warn!(node = %self.id, %message, "no ring successor, message dropped"),
        }
    }

    fn send<R: Router + ?Sized>(&mut self, destination: NodeId, message: Message, router: &R) {
        let envelope = Envelope::new(self.id, destination, message);
        self.forward(envelope, router);
    }

    fn forward<R: Router + ?Sized>(&mut self, envelope: Envelope, router: &R) {
        let hop = router.next_hop(self.id, envelope.destination);
        self.outbox.push(Outgoing::Hop { hop, envelope });
    }
}
