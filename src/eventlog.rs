/// Human-readable run log.
///
/// Records the protocol events worth keeping after a run: elected
/// leaders, failures reported to the network, a disconnection if one
/// halted the run, and a final completion marker. The log renders to
/// one text line per record and folds into a deterministic digest so two
/// runs of the same inputs can be compared cheaply.

use std::io::{self, Write};
use std::path::Path;

use crate::node::NodeId;
use crate::round::Round;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

// ── LogRecord ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum LogRecord {
    /// A leader's announcement completed its lap of the ring.
    LeaderElected { round: Round, leader: NodeId },
    /// `reporter` declared its successor `node` failed.
    NodeFailed {
        round: Round,
        node: NodeId,
        reporter: NodeId,
    },
    /// Repair found no live path from `node` to `target`.
    Disconnected {
        round: Round,
        node: NodeId,
        target: NodeId,
    },
    /// The run ended after `rounds` rounds.
    Completed { rounds: u64 },
}

impl LogRecord {
    fn digest(&self) -> u64 {
        match self {
            LogRecord::LeaderElected { round, leader } => {
                hash_combine(hash_combine(1, round.number()), leader.raw())
            }
            LogRecord::NodeFailed {
                round,
                node,
                reporter,
            } => hash_combine(
                hash_combine(hash_combine(2, round.number()), node.raw()),
                reporter.raw(),
            ),
            LogRecord::Disconnected {
                round,
                node,
                target,
            } => hash_combine(
                hash_combine(hash_combine(3, round.number()), node.raw()),
                target.raw(),
            ),
            LogRecord::Completed { rounds } => hash_combine(4, *rounds),
        }
    }
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogRecord::LeaderElected { leader, .. } => write!(f, "Leader Node {}", leader.raw()),
            LogRecord::NodeFailed { node, reporter, .. } => write!(
                f,
                "Node {} failed (detected by node {})",
                node.raw(),
                reporter.raw()
            ),
            LogRecord::Disconnected { node, target, .. } => write!(
                f,
                "Network disconnected: node {} cannot reach node {}",
                node.raw(),
                target.raw()
            ),
            LogRecord::Completed { rounds } => {
                write!(f, "Simulation complete after {} rounds", rounds)
            }
        }
    }
}

// ── RunLog ────────────────────────────────────────────────────────────

/// Append-only, ordered list of [`LogRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunLog {
    records: Vec<LogRecord>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Elected leaders, in report order.
    pub fn leaders(&self) -> Vec<NodeId> {
        self.records
            .iter()
            .filter_map(|r| match r {
                LogRecord::LeaderElected { leader, .. } => Some(*leader),
                _ => None,
            })
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.records.last(), Some(LogRecord::Completed { .. }))
    }

    /// Deterministic hash of every record, in order.
    pub fn digest(&self) -> u64 {
        self.records
            .iter()
            .fold(0, |h, record| hash_combine(h, record.digest()))
    }

    /// Write one line per record.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for record in &self.records {
            writeln!(w, "{}", record)?;
        }
        Ok(())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut f = io::BufWriter::new(std::fs::File::create(path)?);
        self.write_to(&mut f)?;
        f.flush()
    }

    pub fn render(&self) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}
