/// Simulation parameters.

use std::time::Duration;

/// Rounds executed after the last scheduled action so in-flight
/// protocol traffic can settle.
pub const DEFAULT_GRACE_ROUNDS: u64 = 50;
/// Idle rounds (`T`) before a node probes its successor.
pub const DEFAULT_PROBE_INTERVAL: u64 = 5;
/// Expected round-trip bound (`D`); a probe times out after `2 * D` rounds.
pub const DEFAULT_ROUND_TRIP: u64 = 5;
/// Wall-clock budget for a single node step.
pub const DEFAULT_STEP_BUDGET: Duration = Duration::from_millis(20);

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Trailing rounds after the last scheduled event (`Δ`).
    pub grace_rounds: u64,
    /// Failure detector idle interval (`T`).
    pub probe_interval: u64,
    /// Failure detector round-trip bound (`D`).
    pub round_trip: u64,
    /// Step duration above which a fairness fault is logged. Exceeding it
    /// never changes protocol behavior.
    pub step_budget: Duration,
}

impl SimConfig {
    pub fn with_grace_rounds(mut self, rounds: u64) -> Self {
        self.grace_rounds = rounds;
        self
    }

    pub fn with_probe_interval(mut self, rounds: u64) -> Self {
        self.probe_interval = rounds;
        self
    }

    pub fn with_round_trip(mut self, rounds: u64) -> Self {
        self.round_trip = rounds;
        self
    }

    pub fn with_step_budget(mut self, budget: Duration) -> Self {
        self.step_budget = budget;
        self
    }

    /// Rounds from a detector reset until a silent successor is
    /// suspected: `T + 1` idle ticks, then `2 * D + 1` waiting ticks.
    pub fn detection_window(&self) -> u64 {
        self.probe_interval
            .saturating_add(self.round_trip.saturating_mul(2))
            .saturating_add(2)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            grace_rounds: DEFAULT_GRACE_ROUNDS,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            round_trip: DEFAULT_ROUND_TRIP,
            step_budget: DEFAULT_STEP_BUDGET,
        }
    }
}
