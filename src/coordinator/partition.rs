//! Sample partitioning
//!
//! Every worker but the last receives `total / group_size` samples; the last
//! worker also absorbs the remainder, so shares always sum to `total`.
//!
//! # Example
//!
//! ```
//! use pidist::coordinator::partition::Partition;
//!
//! let partition = Partition::new(100, 3).unwrap();
//! let shares: Vec<u64> = partition.shares().collect();
//! assert_eq!(shares, vec![33, 33, 34]);
//! ```

use super::CoordinatorError;
use crate::group::GroupError;

/// Split of a sample total across a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    total: u64,
    group_size: usize,
}

impl Partition {
    /// Plan a split of `total` samples across `group_size` workers
    ///
    /// Fails when some worker would be left without samples
    /// (`total < group_size`).
    pub fn new(total: u64, group_size: usize) -> Result<Self, CoordinatorError> {
        if group_size == 0 {
            return Err(GroupError::EmptyGroup.into());
        }
        if total < group_size as u64 {
            return Err(CoordinatorError::DegeneratePartition { total, group_size });
        }

        Ok(Self { total, group_size })
    }

    /// Samples given to every worker except the last
    pub fn base(&self) -> u64 {
        self.total / self.group_size as u64
    }

    /// Samples for `rank`, or `None` if the rank is outside the group
    pub fn share(&self, rank: usize) -> Option<u64> {
        if rank >= self.group_size {
            return None;
        }

        let base = self.base();
        if rank == self.group_size - 1 {
            Some(self.total - (self.group_size as u64 - 1) * base)
        } else {
            Some(base)
        }
    }

    /// Shares in rank order
    pub fn shares(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.group_size).filter_map(move |rank| self.share(rank))
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }
}
