/// Round-based simulation controller.
///
/// Drives rounds `0..last_event_round + grace`. Each round every node
/// steps once, in declaration order, with the action the schedule assigns
/// it. Reports addressed to the network are handled as soon as the
/// reporting node finishes its step; everything else goes to the bus,
/// which delivers at the round barrier. The loop is single-threaded, so
/// no node can observe a half-finished round.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::bus::MessageBus;
use crate::config::SimConfig;
use crate::error::{RingError, RingResult};
use crate::eventlog::{LogRecord, RunLog};
use crate::node::{NetworkReport, NodeId, NodeState, Outgoing, RingNode};
use crate::round::Round;
use crate::schedule::Schedule;
use crate::topology::{Adjacency, RepairOutcome, Topology};

// ── Outcome / Stats ───────────────────────────────────────────────────

/// Result of [`Simulation::step_round`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RoundOutcome {
    /// A round ran and more remain.
    Continued,
    /// Every planned round has run.
    Completed,
    /// The ring became disconnected; no further rounds run.
    Halted,
}

impl RoundOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RoundOutcome::Continued)
    }
}

/// Counters gathered while running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunStats {
    pub rounds_executed: u64,
    pub leader_reports: u64,
    pub failure_reports: u64,
    /// Node steps that ran longer than the configured budget.
    pub budget_overruns: u64,
    pub delivered: usize,
    pub deferred: usize,
    pub dropped: usize,
}

/// Snapshot of one node for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeSummary {
    pub id: NodeId,
    pub state: NodeState,
    pub leader: Option<NodeId>,
}

/// Final (or intermediate) view of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationReport {
    pub outcome: RoundOutcome,
    pub disconnected: bool,
    /// Live ring in successor order.
    pub ring: Vec<NodeId>,
    pub failed: Vec<NodeId>,
    pub nodes: Vec<NodeSummary>,
    pub stats: RunStats,
    pub log: RunLog,
}

impl SimulationReport {
    /// Leaders reported to the network, in order.
    pub fn leaders(&self) -> Vec<NodeId> {
        self.log.leaders()
    }

    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Owns the topology, every node, the bus and the run log. Call `run`
/// to execute to the end, or `step_round` to advance one round at a time.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    topology: Topology,
    schedule: Schedule,
    nodes: BTreeMap<NodeId, RingNode>,
    bus: MessageBus,
    log: RunLog,
    stats: RunStats,
    /// Next round to execute.
    round: Round,
    /// First round that will not execute.
    end: Round,
    disconnected: bool,
    outcome: Option<RoundOutcome>,
}

impl Simulation {
    /// Build the ring from `adjacency` and prepare to run `schedule`.
    ///
    /// Fails if the schedule names a node the graph does not declare.
    pub fn new(adjacency: &Adjacency, schedule: Schedule, config: SimConfig) -> RingResult<Self> {
        let topology = Topology::new(adjacency);
        if let Some(unknown) = schedule.nodes().into_iter().find(|id| !topology.contains(*id)) {
            return Err(RingError::UnknownNode(unknown));
        }
        let nodes = topology
            .order()
            .iter()
            .map(|&id| (id, RingNode::new(id, config.probe_interval, config.round_trip)))
            .collect();
        let last = schedule.last_round().unwrap_or(Round::ZERO);
        let end = last.plus(config.grace_rounds).unwrap_or(Round::new(u64::MAX));
        info!(
            nodes = topology.len(),
            last_event = last.number(),
            rounds = end.number(),
            "simulation ready"
        );
        Ok(Simulation {
            config,
            topology,
            schedule,
            nodes,
            bus: MessageBus::new(),
            log: RunLog::new(),
            stats: RunStats::default(),
            round: Round::ZERO,
            end,
            disconnected: false,
            outcome: None,
        })
    }

    /// Read and parse the graph and schedule files.
    pub fn from_files(
        graph: impl AsRef<Path>,
        schedule: impl AsRef<Path>,
        config: SimConfig,
    ) -> RingResult<Self> {
        let adjacency = Adjacency::parse(&read_input(graph.as_ref())?)?;
        let (schedule, format) = Schedule::parse_detect(&read_input(schedule.as_ref())?)?;
        debug!(?format, "schedule loaded");
        Self::new(&adjacency, schedule, config)
    }

    // ── Execution ─────────────────────────────────────────────────

    /// Execute one round.
    pub fn step_round(&mut self) -> RoundOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        if self.disconnected {
            warn!(round = %self.round, "halting: ring is disconnected");
            return self.finish(RoundOutcome::Halted);
        }
        if self.round >= self.end {
            return self.finish(RoundOutcome::Completed);
        }

        let round = self.round;
        debug!(%round, "round start");
        for index in 0..self.topology.len() {
            let id = self.topology.order()[index];
            let action = self.schedule.action_for(round, id);
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };

            let started = Instant::now();
            node.step(action, &self.topology);
            let elapsed = started.elapsed();
            if elapsed > self.config.step_budget {
                warn!(node = %id, ?elapsed, budget = ?self.config.step_budget, "node step overran its budget");
                self.stats.budget_overruns += 1;
            }

            for outgoing in node.take_outgoing() {
                match outgoing {
                    Outgoing::Hop { hop, envelope } => {
                        self.bus.collect(round, id, hop, envelope, &self.topology);
                    }
                    Outgoing::Network(report) => self.intercept(round, id, report),
                }
            }
        }
        self.bus.deliver(round, &mut self.nodes);

        self.stats.rounds_executed += 1;
        self.round = round.next().unwrap_or(self.end);
        RoundOutcome::Continued
    }

    /// Run until the last planned round or a disconnection halt.
    pub fn run(&mut self) -> SimulationReport {
        while !self.step_round().is_terminal() {}
        self.report()
    }

    /// Run at most `max_rounds` more rounds.
    pub fn run_for(&mut self, max_rounds: u64) -> RoundOutcome {
        let mut outcome = self.outcome.unwrap_or(RoundOutcome::Continued);
        for _ in 0..max_rounds {
            outcome = self.step_round();
            if outcome.is_terminal() {
                break;
            }
        }
        outcome
    }

    fn intercept(&mut self, round: Round, reporter: NodeId, report: NetworkReport) {
        match report {
            NetworkReport::LeaderElected(leader) => {
                info!(%round, %leader, "leader elected");
                self.stats.leader_reports += 1;
                self.log.push(LogRecord::LeaderElected { round, leader });
            }
            NetworkReport::FailedNode(node) => {
                self.stats.failure_reports += 1;
                if !self.topology.mark_failed(node) {
                    debug!(%round, %node, "failure already known");
                    return;
                }
                warn!(%round, %node, %reporter, "node reported failed");
                self.log.push(LogRecord::NodeFailed {
                    round,
                    node,
                    reporter,
                });
                for outcome in self.topology.repair(node) {
                    if let RepairOutcome::Unreachable { node, target } = outcome {
                        error!(%round, %node, %target, "ring disconnected");
                        self.disconnected = true;
                        self.log.push(LogRecord::Disconnected {
                            round,
                            node,
                            target,
                        });
                    }
                }
            }
        }
    }

    fn finish(&mut self, outcome: RoundOutcome) -> RoundOutcome {
        self.outcome = Some(outcome);
        self.log.push(LogRecord::Completed {
            rounds: self.stats.rounds_executed,
        });
        info!(rounds = self.stats.rounds_executed, ?outcome, "simulation finished");
        outcome
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn node(&self, id: NodeId) -> Option<&RingNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RingNode> + '_ {
        self.nodes.values()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// The next round to execute.
    pub fn current_round(&self) -> Round {
        self.round
    }

    /// First round that will not be executed.
    pub fn end_round(&self) -> Round {
        self.end
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            delivered: self.bus.delivered_count(),
            deferred: self.bus.deferred_count(),
            dropped: self.bus.dropped_count(),
            ..self.stats.clone()
        }
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            outcome: self.outcome.unwrap_or(RoundOutcome::Continued),
            disconnected: self.disconnected,
            ring: self.topology.ring(),
            failed: self.topology.failed().iter().copied().collect(),
            nodes: self
                .nodes
                .values()
                .map(|node| NodeSummary {
                    id: node.id(),
                    state: node.state(),
                    leader: node.leader(),
                })
                .collect(),
            stats: self.stats(),
            log: self.log.clone(),
        }
    }
}

fn read_input(path: &Path) -> RingResult<String> {
    std::fs::read_to_string(path).map_err(|e| RingError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Router;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn ring5(schedule: Schedule) -> Simulation {
        let adj = Adjacency::ring(&[1, 2, 3, 4, 5]).unwrap();
        Simulation::new(&adj, schedule, SimConfig::default()).unwrap()
    }

    #[test]
    fn test_single_elector_elects_max() {
        let mut sim = ring5(Schedule::new().elect(0, 3));
        let report = sim.run();

        assert_eq!(report.outcome, RoundOutcome::Completed);
        assert_eq!(report.leaders(), vec![n(5)]);
        assert_eq!(sim.log().render().lines().next(), Some("Leader Node 5"));
        for node in sim.nodes() {
            assert_eq!(node.leader(), Some(n(5)));
            assert_eq!(node.is_leader(), node.id() == n(5));
        }
    }

    #[test]
    fn test_round_count_is_last_event_plus_grace() {
        let adj = Adjacency::ring(&[1, 2, 3]).unwrap();
        let config = SimConfig::default().with_grace_rounds(7);
        let mut sim = Simulation::new(&adj, Schedule::new().elect(4, 1), config).unwrap();
        let report = sim.run();
        assert_eq!(report.stats.rounds_executed, 11);
        assert_eq!(
            report.log.records().last(),
            Some(&LogRecord::Completed { rounds: 11 })
        );
        // Further stepping is inert.
        assert_eq!(sim.step_round(), RoundOutcome::Completed);
        assert_eq!(sim.stats().rounds_executed, 11);
    }

    #[test]
    fn test_step_by_step_leader_report() {
        let mut sim = ring5(Schedule::new().elect(0, 3));
        // Two laps of the ring plus a few rounds lost to probe traffic
        // sharing links.
        let outcome = sim.run_for(20);
        assert_eq!(outcome, RoundOutcome::Continued);
        assert_eq!(sim.current_round(), Round::new(20));
        assert_eq!(sim.log().leaders(), vec![n(5)]);
        assert!(!sim.is_finished());
    }

    #[test]
    fn test_unknown_scheduled_node_rejected() {
        let adj = Adjacency::ring(&[1, 2]).unwrap();
        let err = Simulation::new(&adj, Schedule::new().fail(3, 9), SimConfig::default());
        assert!(matches!(err, Err(RingError::UnknownNode(id)) if id == n(9)));
    }

    #[test]
    fn test_failure_repaired_and_leader_reelected() {
        // Chords keep the ring connected around 5.
        let adj = Adjacency::parse("1 4\n2\n3\n4 1\n5\n").unwrap();
        let mut sim = Simulation::new(
            &adj,
            Schedule::new().elect(0, 3).fail(20, 5),
            SimConfig::default(),
        )
        .unwrap();
        let report = sim.run();

        assert!(!report.disconnected);
        assert_eq!(report.failed, vec![n(5)]);
        assert_eq!(report.ring, vec![n(1), n(2), n(3), n(4)]);
        assert_eq!(sim.topology().successor(n(4)), Some(n(1)));
        assert_eq!(report.leaders(), vec![n(5), n(4)]);
        for node in sim.nodes().filter(|node| !node.is_failed()) {
            assert_eq!(node.leader(), Some(n(4)));
        }
        assert!(matches!(
            report.log.records()[1],
            LogRecord::NodeFailed { node, reporter, .. } if node == n(5) && reporter == n(4)
        ));
    }

    #[test]
    fn test_two_node_ring_disconnects_and_halts() {
        let adj = Adjacency::ring(&[1, 2]).unwrap();
        let mut sim = Simulation::new(&adj, Schedule::new().fail(0, 2), SimConfig::default()).unwrap();
        let report = sim.run();

        assert_eq!(report.outcome, RoundOutcome::Halted);
        assert!(report.disconnected);
        // Halted well before the 50 grace rounds ran out.
        assert!(report.stats.rounds_executed < 50);
        assert!(report
            .log
            .records()
            .iter()
            .any(|r| matches!(r, LogRecord::Disconnected { node, .. } if *node == n(1))));
        assert!(report.log.is_completed());
    }

    #[test]
    fn test_from_files() {
        let dir = std::env::temp_dir();
        let graph = dir.join(format!("ringnet-graph-{}.txt", std::process::id()));
        let schedule = dir.join(format!("ringnet-schedule-{}.txt", std::process::id()));
        std::fs::write(&graph, "1\n2\n3\n").unwrap();
        std::fs::write(&schedule, "ELECT 0 1\nFAIL 30 2\n").unwrap();

        let sim = Simulation::from_files(&graph, &schedule, SimConfig::default());
        std::fs::remove_file(&graph).unwrap();
        std::fs::remove_file(&schedule).unwrap();
        let sim = sim.unwrap();
        assert_eq!(sim.end_round(), Round::new(80));
        assert_eq!(sim.schedule().failure_at(Round::new(30)), Some(n(2)));

        let missing = Simulation::from_files(dir.join("ringnet-no-such-file"), &schedule, SimConfig::default());
        assert!(matches!(missing, Err(RingError::Io { .. })));
    }

    #[test]
    fn test_no_unauthorized_sends_on_healthy_ring() {
        let mut sim = ring5(Schedule::new().elect(0, 1).elect(0, 4).elect(3, 2));
        let report = sim.run();
        assert_eq!(sim.bus().unauthorized_count(), 0);
        assert_eq!(report.leaders(), vec![n(5)]);
    }

    #[test]
    fn test_repeat_election_same_leader_logged_once() {
        let mut sim = ring5(Schedule::new().elect(0, 3).elect(30, 1));
        let report = sim.run();
        assert_eq!(report.outcome, RoundOutcome::Completed);
        assert_eq!(report.leaders(), vec![n(5)]);
        assert_eq!(
            report.log.render().matches("Leader Node 5").count(),
            1
        );
        for node in sim.nodes() {
            assert_eq!(node.leader(), Some(n(5)));
        }
    }

    #[test]
    fn test_one_sided_chord_repair_keeps_live_successor() {
        // Only node 1 declares its chord to 3.
        let adj = Adjacency::parse("1 3\n2\n3\n4\n5\n").unwrap();
        let mut sim = Simulation::new(
            &adj,
            Schedule::new().elect(0, 3).fail(20, 2),
            SimConfig::default(),
        )
        .unwrap();
        let report = sim.run();

        assert!(!report.disconnected);
        assert_eq!(report.failed, vec![n(2)]);
        assert_eq!(report.ring, vec![n(1), n(3), n(4), n(5)]);
        assert_eq!(sim.bus().unauthorized_count(), 0);
        assert_eq!(report.leaders(), vec![n(5)]);
        for node in sim.nodes().filter(|node| !node.is_failed()) {
            assert!(node.known_failed().iter().all(|&id| id == n(2)));
        }
    }

    #[test]
    fn test_three_hop_tunnel_at_default_timeouts() {
        // Ring 1-2-3-4-5 with chords 1-3 and 3-5. Losing 3 leaves 2
        // reaching 4 through 1 and 5.
        let adj = Adjacency::parse("1 3\n2\n3 1 5\n4\n5 3\n").unwrap();
        let mut sim = Simulation::new(
            &adj,
            Schedule::new().elect(0, 3).fail(20, 3),
            SimConfig::default(),
        )
        .unwrap();
        let report = sim.run();

        assert!(!report.disconnected);
        assert_eq!(report.failed, vec![n(3)]);
        assert_eq!(sim.topology().successor(n(2)), Some(n(4)));
        assert_eq!(
            sim.topology().resolve(n(2), n(4)),
            Some(vec![n(2), n(1), n(5), n(4)])
        );
        assert_eq!(
            sim.topology().resolve(n(4), n(2)),
            Some(vec![n(4), n(5), n(1), n(2)])
        );
        // Probes keep crossing the tunnel for the rest of the run without
        // any live node being suspected.
        for node in sim.nodes().filter(|node| !node.is_failed()) {
            assert!(node.known_failed().iter().all(|&id| id == n(3)));
        }
        assert_eq!(report.stats.failure_reports, 1);
        assert_eq!(sim.bus().unauthorized_count(), 0);
        assert_eq!(report.leaders(), vec![n(5)]);
    }
}
