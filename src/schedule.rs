/// Per-round external actions: who starts an election, who crashes.
///
/// Two text shapes are accepted:
///
/// ```text
/// election-only            combined
/// 0 3                      ELECT 0 3
/// 12 1 4                   FAIL 40 5
///                          ELECT 60 1
/// ```
///
/// Election-only lines may carry a leading `ELECT` keyword. Parsing
/// first tries the election-only grammar; a `FAIL` token makes it bail
/// out with [`ElectionParseError::NotThisFormat`] and the text is parsed
/// again with the combined grammar.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::error::{RingError, RingResult};
use crate::node::{Action, NodeId};
use crate::round::Round;

const ELECT: &str = "ELECT";
const FAIL: &str = "FAIL";

/// Which grammar a schedule text was read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ScheduleFormat {
    ElectionOnly,
    Combined,
}

/// Failure of the election-only grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElectionParseError {
    /// The text contains combined-format lines; try the other grammar.
    #[error("line {line} uses the combined ELECT/FAIL format")]
    NotThisFormat { line: usize },
    #[error(transparent)]
    Malformed(#[from] RingError),
}

/// Immutable plan of external actions, keyed by round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Schedule {
    elections: BTreeMap<Round, BTreeSet<NodeId>>,
    failures: BTreeMap<Round, NodeId>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Have `node` start an election at `round`.
    pub fn elect(mut self, round: u64, node: u64) -> Self {
        self.add_election(Round::new(round), NodeId::new(node));
        self
    }

    /// Crash `node` at `round`, replacing any failure already planned
    /// for that round.
    pub fn fail(mut self, round: u64, node: u64) -> Self {
        self.failures.insert(Round::new(round), NodeId::new(node));
        self
    }

    fn add_election(&mut self, round: Round, node: NodeId) {
        self.elections.entry(round).or_default().insert(node);
    }

    fn add_failure(&mut self, line: usize, round: Round, node: NodeId) -> RingResult<()> {
        if let Some(existing) = self.failures.get(&round) {
            return Err(RingError::MalformedSchedule {
                line,
                reason: format!("{round} already fails node {}", existing.raw()),
            });
        }
        self.failures.insert(round, node);
        Ok(())
    }

    // ── Parsing ───────────────────────────────────────────────────

    /// Parse either shape, reporting which one matched.
    pub fn parse_detect(text: &str) -> RingResult<(Self, ScheduleFormat)> {
        match parse_election_only(text) {
            Ok(schedule) => Ok((schedule, ScheduleFormat::ElectionOnly)),
            Err(ElectionParseError::NotThisFormat { line }) => {
                debug!(line, "falling back to combined schedule format");
                parse_combined(text).map(|schedule| (schedule, ScheduleFormat::Combined))
            }
            Err(ElectionParseError::Malformed(e)) => Err(e),
        }
    }

    pub fn parse(text: &str) -> RingResult<Self> {
        Self::parse_detect(text).map(|(schedule, _)| schedule)
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn electors_at(&self, round: Round) -> Option<&BTreeSet<NodeId>> {
        self.elections.get(&round)
    }

    pub fn failure_at(&self, round: Round) -> Option<NodeId> {
        self.failures.get(&round).copied()
    }

    /// The action `node` receives at `round`. A planned failure wins over
    /// an election in the same round.
    pub fn action_for(&self, round: Round, node: NodeId) -> Action {
        if self.failure_at(round) == Some(node) {
            Action::Fail
        } else if self
            .electors_at(round)
            .is_some_and(|electors| electors.contains(&node))
        {
            Action::StartElection
        } else {
            Action::None
        }
    }

    /// The highest round any action is planned for.
    pub fn last_round(&self) -> Option<Round> {
        let elect = self.elections.keys().next_back().copied();
        let fail = self.failures.keys().next_back().copied();
        elect.max(fail)
    }

    /// Every node the schedule mentions.
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.elections
            .values()
            .flatten()
            .copied()
            .chain(self.failures.values().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.elections.is_empty() && self.failures.is_empty()
    }
}

fn parse_number<T: std::str::FromStr>(line: usize, token: &str, what: &str) -> RingResult<T>
where
    T::Err: std::fmt::Display,
{
    token.parse::<T>().map_err(|e| RingError::MalformedSchedule {
        line,
        reason: format!("invalid {what} {token:?}: {e}"),
    })
}

/// Parse `[ELECT] round electorId...` lines.
pub fn parse_election_only(text: &str) -> Result<Schedule, ElectionParseError> {
    let mut schedule = Schedule::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let mut tokens: Vec<&str> = raw.split_whitespace().collect();
        match tokens.first() {
            None => continue,
            Some(&FAIL) => return Err(ElectionParseError::NotThisFormat { line }),
            Some(&ELECT) => {
                tokens.remove(0);
            }
            Some(_) => {}
        }
        let Some((round, electors)) = tokens.split_first() else {
            return Err(RingError::MalformedSchedule {
                line,
                reason: "missing round number".into(),
            }
            .into());
        };
        if electors.is_empty() {
            return Err(RingError::MalformedSchedule {
                line,
                reason: "no electors listed".into(),
            }
            .into());
        }
        let round = Round::new(parse_number(line, round, "round")?);
        for elector in electors {
            let id: NodeId = parse_number(line, elector, "node id")?;
            schedule.add_election(round, id);
        }
    }
    Ok(schedule)
}

/// Parse `ELECT round nodeId` / `FAIL round nodeId` lines.
pub fn parse_combined(text: &str) -> RingResult<Schedule> {
    let mut schedule = Schedule::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        let (kind, round, node) = match tokens.as_slice() {
            [] => continue,
            [kind, round, node] => (*kind, *round, *node),
            _ => {
                return Err(RingError::MalformedSchedule {
                    line,
                    reason: format!("expected `KIND round node`, got {raw:?}"),
                })
            }
        };
        let round = Round::new(parse_number(line, round, "round")?);
        let node: NodeId = parse_number(line, node, "node id")?;
        match kind {
            ELECT => schedule.add_election(round, node),
            FAIL => schedule.add_failure(line, round, node)?,
            other => {
                return Err(RingError::MalformedSchedule {
                    line,
                    reason: format!("unknown event kind {other:?}"),
                })
            }
        }
    }
    Ok(schedule)
}
