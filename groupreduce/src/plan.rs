//! Exchange plans: which peer a rank talks to at each step.
//!
//! Every function here is a pure function of `(rank, size, step)`. Ranks
//! never negotiate partners, so any two ranks always agree on who meets
//! whom at a given step.

use crate::config::AlgorithmChoice;
use crate::group::ProcessGroup;
use crate::types::Rank;

/// Reduction strategy, chosen once per call from the group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Single-member group: the local value is the result, no communication.
    Local,
    /// Pairwise XOR exchanges, `log2(N)` rounds. Power-of-two groups only.
    RecursiveDoubling,
    /// Reduce along the ring then forward the total around it, `2(N-1)` hops.
    Ring,
}

impl Strategy {
    /// Pick the strategy for `group`.
    pub fn select(group: &ProcessGroup, choice: AlgorithmChoice) -> Self {
        match choice {
            _ if group.size() == 1 => Strategy::Local,
            AlgorithmChoice::Ring => Strategy::Ring,
            AlgorithmChoice::Auto if group.is_power_of_two() => Strategy::RecursiveDoubling,
            AlgorithmChoice::Auto => Strategy::Ring,
        }
    }

    /// Number of sequential exchange rounds over `group`.
    pub fn rounds(self, group: &ProcessGroup) -> u32 {
        match self {
            Strategy::Local => 0,
            Strategy::RecursiveDoubling => group.log2_size(),
            Strategy::Ring => 2 * (group.size() - 1),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Strategy::Local => "local",
            Strategy::RecursiveDoubling => "recursive-doubling",
            Strategy::Ring => "ring",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Partner of `rank` at recursive-doubling step `step`: flip bit `step`.
#[inline]
pub fn recursive_doubling_partner(rank: Rank, step: u32) -> Rank {
    rank ^ (1 << step)
}

/// What a rank does at one ring hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingAction {
    /// Send the current partial result to `to`.
    Send { to: Rank },
    /// Receive from `from`. In the reduce phase the payload is combined
    /// into the local value (`accumulate`); in the broadcast phase it
    /// replaces it.
    Receive { from: Rank, accumulate: bool },
}

/// One entry of a rank's ring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingHop {
    pub hop: u32,
    pub action: RingAction,
}

/// Ordered list of the ring hops `group.rank()` takes part in.
///
/// With `last = size - 1`, hop `h < last` carries the running accumulation
/// from rank `h` to `h + 1`, and hop `last + j` carries the total from
/// `prev(j)` to rank `j`, for `j` in `0..last`. A rank therefore receives
/// from its predecessor and sends to its successor, at most twice each.
pub fn ring_schedule(group: ProcessGroup) -> Vec<RingHop> {
    let size = group.size();
    if size == 1 {
        return Vec::new();
    }
    let rank = group.rank();
    let (prev, next) = (group.prev_rank(), group.next_rank());
    let last = size - 1;

    let mut hops = Vec::with_capacity(4);
    if rank > 0 {
        hops.push(RingHop {
            hop: rank - 1,
            action: RingAction::Receive { from: prev, accumulate: true },
        });
    }
    if rank < last {
        hops.push(RingHop {
            hop: rank,
            action: RingAction::Send { to: next },
        });
        hops.push(RingHop {
            hop: last + rank,
            action: RingAction::Receive { from: prev, accumulate: false },
        });
    }
    if next < last {
        hops.push(RingHop {
            hop: last + next,
            action: RingAction::Send { to: next },
        });
    }
    hops
}

/// The full plan one rank follows for one collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangePlan {
    group: ProcessGroup,
    strategy: Strategy,
}

impl ExchangePlan {
    pub fn new(group: ProcessGroup, choice: AlgorithmChoice) -> Self {
        Self {
            group,
            strategy: Strategy::select(&group, choice),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn rounds(&self) -> u32 {
        self.strategy.rounds(&self.group)
    }

    /// Recursive-doubling partners in step order.
    pub fn doubling_partners(&self) -> impl Iterator<Item = (u32, Rank)> + '_ {
        let rank = self.group.rank();
        let steps = match self.strategy {
            Strategy::RecursiveDoubling => self.rounds(),
            _ => 0,
        };
        (0..steps).map(move |step| (step, recursive_doubling_partner(rank, step)))
    }

    pub fn ring_schedule(&self) -> Vec<RingHop> {
        match self.strategy {
            Strategy::Ring => ring_schedule(self.group),
            _ => Vec::new(),
        }
    }
}
