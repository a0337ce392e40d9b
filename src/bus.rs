/// Round delivery layer.
///
/// During a round the controller hands every outbound envelope to the
/// bus together with the physical hop the sender picked. At the round
/// barrier the bus delivers at most one envelope per `(sender, hop)`
/// pair; the rest stay queued, in order, for later rounds. Sends across a
/// pair that is not a physical link are dropped on arrival.

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::node::{Envelope, NodeId, RingNode};
use crate::round::Round;
use crate::topology::Topology;

// ── Bus Decision ──────────────────────────────────────────────────────

/// What happened to an envelope at the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BusDecision {
    /// Placed in the hop's inbox at the end of the round.
    Delivered,
    /// The pair already carried a message this round; retried later.
    Deferred,
    /// The hop is not a physical neighbor of the sender.
    DroppedUnauthorized,
    /// The hop has crashed.
    DroppedRecipientFailed,
}

/// A log entry recording one bus decision.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DeliveryRecord {
    pub round: Round,
    pub from: NodeId,
    pub to: NodeId,
    pub envelope: Envelope,
    pub decision: BusDecision,
}

// ── MessageBus ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MessageBus {
    /// FIFO per `(sender, hop)` link.
    pending: BTreeMap<(NodeId, NodeId), VecDeque<Envelope>>,
    /// Append-only log of all decisions.
    log: Vec<DeliveryRecord>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an envelope `from` wants handed to `hop`.
    ///
    /// Unauthorized hops are rejected immediately so they never occupy a
    /// link slot.
    pub fn collect(
        &mut self,
        round: Round,
        from: NodeId,
        hop: NodeId,
        envelope: Envelope,
        topology: &Topology,
    ) {
        if !topology.is_neighbor(from, hop) {
            trace!(%from, %hop, %envelope, "dropping send over missing link");
            self.record(round, from, hop, envelope, BusDecision::DroppedUnauthorized);
            return;
        }
        self.pending.entry((from, hop)).or_default().push_back(envelope);
    }

    /// Deliver the head of every link queue. Returns the number of
    /// envelopes placed in inboxes.
    pub fn deliver(&mut self, round: Round, nodes: &mut BTreeMap<NodeId, RingNode>) -> usize {
        let mut delivered = 0;
        let mut records = Vec::new();

        for (&(from, to), queue) in self.pending.iter_mut() {
            let Some(envelope) = queue.pop_front() else {
                continue;
            };
            let decision = match nodes.get_mut(&to) {
                Some(node) if !node.is_failed() => {
                    trace!(%round, %from, %to, %envelope, "delivered");
                    node.deliver(envelope);
                    delivered += 1;
                    BusDecision::Delivered
                }
                _ => BusDecision::DroppedRecipientFailed,
            };
            records.push(DeliveryRecord {
                round,
                from,
                to,
                envelope,
                decision,
            });
            for held in queue.iter() {
                records.push(DeliveryRecord {
                    round,
                    from,
                    to,
                    envelope: *held,
                    decision: BusDecision::Deferred,
                });
            }
        }

        self.pending.retain(|_, queue| !queue.is_empty());
        self.log.extend(records);
        delivered
    }

    fn record(
        &mut self,
        round: Round,
        from: NodeId,
        to: NodeId,
        envelope: Envelope,
        decision: BusDecision,
    ) {
        self.log.push(DeliveryRecord {
            round,
            from,
            to,
            envelope,
            decision,
        });
    }

    // ── Accessors ─────────────────────────────────────────────────

    /// Envelopes still waiting for a free link slot.
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn log(&self) -> &[DeliveryRecord] {
        &self.log
    }

    /// Records of envelopes delivered during `round`.
    pub fn delivered_in(&self, round: Round) -> impl Iterator<Item = &DeliveryRecord> + '_ {
        self.log
            .iter()
            .filter(move |r| r.round == round && r.decision == BusDecision::Delivered)
    }

    pub fn delivered_count(&self) -> usize {
        self.count(|d| d == BusDecision::Delivered)
    }

    /// Number of times an envelope had to wait a round for its link.
    pub fn deferred_count(&self) -> usize {
        self.count(|d| d == BusDecision::Deferred)
    }

    pub fn dropped_count(&self) -> usize {
        self.count(|d| {
            matches!(
                d,
                BusDecision::DroppedUnauthorized | BusDecision::DroppedRecipientFailed
            )
        })
    }

    pub fn unauthorized_count(&self) -> usize {
        self.count(|d| d == BusDecision::DroppedUnauthorized)
    }

    fn count(&self, pred: impl Fn(BusDecision) -> bool) -> usize {
        self.log.iter().filter(|r| pred(r.decision)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Message;
    use crate::topology::Adjacency;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn setup() -> (Topology, BTreeMap<NodeId, RingNode>) {
        let topo = Topology::new(&Adjacency::ring(&[1, 2, 3, 4]).unwrap());
        let nodes = topo
            .order()
            .iter()
            .map(|&id| (id, RingNode::new(id, 5, 5)))
            .collect();
        (topo, nodes)
    }

    fn elect(from: u64, to: u64, candidate: u64) -> Envelope {
        Envelope::new(n(from), n(to), Message::Elect { candidate: n(candidate) })
    }

    #[test]
    fn test_one_message_per_link_per_round() {
        let (topo, mut nodes) = setup();
        let mut bus = MessageBus::new();
        let r0 = Round::new(0);
        bus.collect(r0, n(1), n(2), elect(1, 2, 1), &topo);
        bus.collect(r0, n(1), n(2), elect(1, 2, 7), &topo);
        bus.collect(r0, n(1), n(4), elect(1, 4, 1), &topo);

        assert_eq!(bus.deliver(r0, &mut nodes), 2);
        assert_eq!(nodes[&n(2)].inbox_len(), 1);
        assert_eq!(nodes[&n(4)].inbox_len(), 1);
        assert_eq!(bus.pending_len(), 1);
        assert_eq!(bus.deferred_count(), 1);

        // The held message goes out next round, not lost.
        let r1 = Round::new(1);
        assert_eq!(bus.deliver(r1, &mut nodes), 1);
        assert_eq!(nodes[&n(2)].inbox_len(), 2);
        assert_eq!(bus.pending_len(), 0);
        let late: Vec<_> = bus.delivered_in(r1).collect();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].envelope, elect(1, 2, 7));
    }

    #[test]
    fn test_unauthorized_hop_dropped() {
        let (topo, mut nodes) = setup();
        let mut bus = MessageBus::new();
        let r0 = Round::new(0);
        // 1 and 3 are not adjacent on a bare 4-ring.
        bus.collect(r0, n(1), n(3), elect(1, 3, 1), &topo);
        assert_eq!(bus.pending_len(), 0);
        assert_eq!(bus.deliver(r0, &mut nodes), 0);
        assert_eq!(bus.unauthorized_count(), 1);
        assert_eq!(nodes[&n(3)].inbox_len(), 0);
    }

    #[test]
    fn test_failed_recipient_swallows() {
        let (topo, mut nodes) = setup();
        let mut bus = MessageBus::new();
        let r0 = Round::new(0);
        if let Some(node) = nodes.get_mut(&n(2)) {
            node.step(crate::node::Action::Fail, &topo);
        }
        bus.collect(r0, n(1), n(2), elect(1, 2, 1), &topo);
        assert_eq!(bus.deliver(r0, &mut nodes), 0);
        assert_eq!(bus.dropped_count(), 1);
        assert_eq!(bus.delivered_count(), 0);
    }
}
