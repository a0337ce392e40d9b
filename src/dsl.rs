/// Fluent builder DSL for ring scenarios.
///
/// Hides the boilerplate of assembling an adjacency, a schedule and a
/// configuration by hand, so tests and demos can describe a run in a
/// few chained calls.

use crate::config::SimConfig;
use crate::error::{RingError, RingResult};
use crate::node::NodeId;
use crate::schedule::Schedule;
use crate::simulation::{Simulation, SimulationReport};
use crate::topology::Adjacency;

// ── RingBuilder ───────────────────────────────────────────────────────

/// Fluent builder for a [`Simulation`].
///
/// Nodes are laid out in the ring in the order they are added.
///
/// # Example
/// ```rust
/// use ringnet::dsl::RingBuilder;
///
/// let report = RingBuilder::new()
///     .ring(&[1, 2, 3, 4])
///     .link(1, 3)
///     .elect(0, 2)
///     .grace(30)
///     .run()
///     .unwrap();
/// assert_eq!(report.leaders(), vec![ringnet::NodeId::new(4)]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RingBuilder {
    nodes: Vec<(NodeId, Vec<NodeId>)>,
    links: Vec<(NodeId, NodeId)>,
    schedule: Schedule,
    config: SimConfig,
}

impl RingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Nodes ─────────────────────────────────────────────────

    /// Declare `id` with extra physical links to `neighbors`.
    pub fn node(mut self, id: u64, neighbors: &[u64]) -> Self {
        let links = neighbors.iter().map(|&n| NodeId::new(n)).collect();
        self.nodes.push((NodeId::new(id), links));
        self
    }

    /// Declare several nodes with no extra links.
    pub fn ring(self, ids: &[u64]) -> Self {
        ids.iter().fold(self, |builder, &id| builder.node(id, &[]))
    }

    /// Add a physical link between two nodes. Both ends must be declared
    /// by the time `build` runs.
    pub fn link(mut self, a: u64, b: u64) -> Self {
        self.links.push((NodeId::new(a), NodeId::new(b)));
        self
    }

    // ── Schedule ──────────────────────────────────────────────

    pub fn elect(mut self, round: u64, node: u64) -> Self {
        self.schedule = self.schedule.elect(round, node);
        self
    }

    pub fn fail(mut self, round: u64, node: u64) -> Self {
        self.schedule = self.schedule.fail(round, node);
        self
    }

    /// Replace the whole schedule.
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    // ── Config ────────────────────────────────────────────────

    pub fn grace(mut self, rounds: u64) -> Self {
        self.config.grace_rounds = rounds;
        self
    }

    pub fn probe_interval(mut self, rounds: u64) -> Self {
        self.config.probe_interval = rounds;
        self
    }

    pub fn round_trip(mut self, rounds: u64) -> Self {
        self.config.round_trip = rounds;
        self
    }

    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    // ── Build ─────────────────────────────────────────────────

    pub fn build(mut self) -> RingResult<Simulation> {
        for (a, b) in std::mem::take(&mut self.links) {
            self.attach(a, b)?;
            self.attach(b, a)?;
        }
        let adjacency = Adjacency::from_entries(self.nodes)?;
        Simulation::new(&adjacency, self.schedule, self.config)
    }

    fn attach(&mut self, from: NodeId, to: NodeId) -> RingResult<()> {
        match self.nodes.iter_mut().find(|(id, _)| *id == from) {
            Some((_, links)) => {
                links.push(to);
                Ok(())
            }
            None => Err(RingError::UnknownNode(from)),
        }
    }

    /// Build and run to the end.
    pub fn run(self) -> RingResult<SimulationReport> {
        let mut sim = self.build()?;
        Ok(sim.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Router;
    use crate::simulation::RoundOutcome;

    #[test]
    fn test_builder_basic() {
        let sim = RingBuilder::new().ring(&[3, 1, 2]).elect(0, 1).build().unwrap();
        let order: Vec<u64> = sim.topology().order().iter().map(|id| id.raw()).collect();
        assert_eq!(order, vec![3, 1, 2]);
        assert_eq!(sim.end_round().number(), 50);
    }

    #[test]
    fn test_builder_links() {
        let sim = RingBuilder::new()
            .ring(&[1, 2, 3, 4, 5])
            .link(1, 3)
            .node(6, &[2])
            .build()
            .unwrap();
        let topo = sim.topology();
        assert!(topo.is_neighbor(NodeId::new(3), NodeId::new(1)));
        // Links declared on one side only still work both ways.
        assert!(topo.is_neighbor(NodeId::new(6), NodeId::new(2)));
        assert!(topo.is_neighbor(NodeId::new(2), NodeId::new(6)));
        assert!(topo.is_neighbor(NodeId::new(1), NodeId::new(6)));
        assert_eq!(topo.successor(NodeId::new(5)), Some(NodeId::new(6)));
    }

    #[test]
    fn test_builder_rejects_unknown() {
        let err = RingBuilder::new().ring(&[1, 2]).link(1, 7).build();
        assert!(matches!(err, Err(RingError::UnknownNode(id)) if id.raw() == 7));

        let err = RingBuilder::new().ring(&[1, 2]).fail(3, 8).build();
        assert!(matches!(err, Err(RingError::UnknownNode(id)) if id.raw() == 8));

        assert!(matches!(RingBuilder::new().build(), Err(RingError::EmptyTopology)));
    }

    #[test]
    fn test_builder_config() {
        let sim = RingBuilder::new()
            .ring(&[1, 2])
            .grace(9)
            .probe_interval(2)
            .round_trip(1)
            .elect(4, 2)
            .build()
            .unwrap();
        assert_eq!(sim.config().probe_interval, 2);
        assert_eq!(sim.config().round_trip, 1);
        assert_eq!(sim.end_round().number(), 13);
    }

    #[test]
    fn test_builder_run() {
        let report = RingBuilder::new()
            .ring(&[2, 7, 4])
            .elect(0, 4)
            .grace(20)
            .run()
            .unwrap();
        assert_eq!(report.outcome, RoundOutcome::Completed);
        assert_eq!(report.leaders(), vec![NodeId::new(7)]);
    }
}
