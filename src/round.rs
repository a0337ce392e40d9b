/// Logical round counter for the lock-step simulation.
///
/// Every node advances in unison: round `r + 1` only starts once the
/// bus has delivered everything produced during round `r`. There is no
/// dependency on `std::time` for protocol behavior.

/// A logical round number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Round(u64);

impl Round {
    /// The first round of every simulation.
    pub const ZERO: Round = Round(0);

    /// Create a round from a raw counter value.
    #[inline]
    pub fn new(n: u64) -> Self {
        Round(n)
    }

    /// Return the raw counter value.
    #[inline]
    pub fn number(self) -> u64 {
        self.0
    }

    /// The round immediately after this one.
    ///
    /// Returns `None` on overflow.
    #[inline]
    pub fn next(self) -> Option<Round> {
        self.0.checked_add(1).map(Round)
    }

    /// Advance by `delta` rounds. Returns `None` on overflow.
    #[inline]
    pub fn plus(self, delta: u64) -> Option<Round> {
        self.0.checked_add(delta).map(Round)
    }

    /// Number of rounds elapsed since `earlier`.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn since(self, earlier: Round) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R={}", self.0)
    }
}
