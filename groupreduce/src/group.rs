//! Immutable view of group membership and the topology helpers the
//! exchange plans are built from.

use crate::error::{ReduceError, Result};
use crate::types::Rank;

/// This process's rank and the fixed group size.
///
/// Supplied by whatever launched the group and passed into the engine at
/// construction; never read from ambient state. A value of this type is
/// always valid: `size >= 1` and `rank < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGroup {
    rank: Rank,
    size: u32,
}

impl ProcessGroup {
    /// Validate and build a group view.
    ///
    /// Fails with `InvalidGroup` if `size == 0` or `rank >= size`.
    pub fn new(rank: Rank, size: u32) -> Result<Self> {
        if size == 0 || rank >= size {
            return Err(ReduceError::InvalidGroup { rank, size });
        }
        Ok(Self { rank, size })
    }

    /// Single-member group: every reduction is the identity transform.
    pub fn solo() -> Self {
        Self { rank: 0, size: 1 }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_power_of_two(&self) -> bool {
        self.size.is_power_of_two()
    }

    /// `floor(log2(size))`. Exact when the size is a power of two.
    pub fn log2_size(&self) -> u32 {
        floor_log2(self.size)
    }

    /// Successor on the ring `(rank + 1) mod size`.
    pub fn next_rank(&self) -> Rank {
        (self.rank + 1) % self.size
    }

    /// Predecessor on the ring `(rank - 1) mod size`.
    pub fn prev_rank(&self) -> Rank {
        (self.rank + self.size - 1) % self.size
    }

    /// Every other rank in the group, ascending.
    pub fn peers(&self) -> impl Iterator<Item = Rank> + '_ {
        (0..self.size).filter(move |&r| r != self.rank)
    }

    pub fn contains(&self, rank: Rank) -> bool {
        rank < self.size
    }
}

/// Integer floor of log2(n). Returns 0 for n <= 1.
fn floor_log2(n: u32) -> u32 {
    if n <= 1 {
        return 0;
    }
    u32::BITS - 1 - n.leading_zeros()
}
