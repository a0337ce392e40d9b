//! # ringnet: Deterministic Ring Network Simulator
//!
//! A lock-step simulation of nodes arranged in a logical ring over an
//! arbitrary physical graph. Nodes elect a leader with the Chang–Roberts
//! protocol, watch their ring successor with a probe-based failure
//! detector, and the topology reroutes around crashed nodes through
//! redirection tables. No async, no threads, no wall-clock time in the
//! protocol: rounds are the only clock.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────┐
//! │          Simulation            │ ← round loop, report interception
//! │  ┌──────────┐  ┌────────────┐ │
//! │  │ Schedule │  │   RunLog   │ │ ← external actions / output lines
//! │  └──────────┘  └────────────┘ │
//! │  ┌──────────┐  ┌────────────┐ │
//! │  │ RingNode │◀─│ MessageBus │ │ ← one message per link per round
//! │  └────┬─────┘  └─────┬──────┘ │
//! │       │ Router       │        │
//! │  ┌────▼──────────────▼──────┐ │
//! │  │         Topology          │ │ ← ring, links, redirection, repair
//! │  └───────────────────────────┘ │
//! └───────────────────────────────┘
//! ```

pub mod bus;
pub mod config;
pub mod dsl;
pub mod error;
pub mod eventlog;
pub mod node;
pub mod round;
pub mod schedule;
pub mod simulation;
pub mod topology;

// Re-exports for convenience.
pub use bus::{BusDecision, DeliveryRecord, MessageBus};
pub use config::SimConfig;
pub use error::{RingError, RingResult};
pub use eventlog::{LogRecord, RunLog};
pub use node::{Action, Envelope, Message, NetworkReport, NodeId, NodeState, RingNode, Router};
pub use round::Round;
pub use schedule::{Schedule, ScheduleFormat};
pub use simulation::{RoundOutcome, RunStats, Simulation, SimulationReport};
pub use topology::{Adjacency, RepairOutcome, Topology};
