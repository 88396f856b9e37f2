//! Process group abstraction
//!
//! A process group is a fixed set of cooperating workers. The coordinator
//! needs exactly four things from it:
//!
//! - **Identity**: this worker's rank (0-based) and the group size
//! - **Clock**: monotonic seconds, comparable between two readings
//! - **Sum reduction**: combine one value per worker, result at rank 0
//! - **Max reduction**: same, combining with maximum
//!
//! Reductions are collective. Every member must call them in the same order;
//! a member that skips one leaves the rest of the group blocked.
//!
//! # Implementations
//!
//! - `local`: in-process group over channels, one thread per worker
//! - `tcp`: multi-process group over TCP
//!
//! # Wire protocol
//!
//! - `protocol`: message definitions and framing used by `tcp`

pub mod local;
pub mod protocol;
pub mod tcp;

pub use local::LocalGroup;
pub use protocol::RunTerms;
pub use tcp::{TcpGroup, TcpGroupListener};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rank that receives reduction results and produces output
pub const DESIGNATED_RANK: usize = 0;

/// Errors raised while forming a group or running a collective
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group size must be at least 1")]
    EmptyGroup,

    #[error("rank {rank} is outside a group of size {size}")]
    RankOutOfRange { rank: usize, size: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("join rejected by designated worker: {0}")]
    Rejected(String),

    #[error("lost contact with rank {0}")]
    PeerLost(usize),

    #[error("timed out after {secs}s forming group at {addr}")]
    JoinTimeout { addr: String, secs: u64 },
}

/// Reduction operator
///
/// Both operators are associative and commutative with an identity element,
/// so contributions can be folded in any grouping. Implementations fold in
/// rank order so results are reproducible bit for bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    Sum,
    Max,
}

impl ReduceOp {
    /// Identity element: `combine(identity(), x) == x`
    pub fn identity(self) -> f64 {
        match self {
            ReduceOp::Sum => 0.0,
            ReduceOp::Max => f64::NEG_INFINITY,
        }
    }

    /// Combine two partial results
    #[inline]
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Max => a.max(b),
        }
    }

    /// Fold values (in the order given) starting from the identity
    pub fn fold<I: IntoIterator<Item = f64>>(self, values: I) -> f64 {
        values
            .into_iter()
            .fold(self.identity(), |acc, v| self.combine(acc, v))
    }
}

/// Capabilities a coordinator needs from its group
pub trait ProcessGroup {
    /// This worker's 0-based position
    fn rank(&self) -> usize;

    /// Number of workers in the group (at least 1)
    fn size(&self) -> usize;

    /// Monotonic seconds; only differences between readings are meaningful
    fn wtime(&self) -> f64;

    /// Blocking collective reduction
    ///
    /// Returns `Some(result)` on the designated worker and `None` on every
    /// other member. Returns only after every member has contributed.
    fn reduce(&mut self, op: ReduceOp, value: f64) -> Result<Option<f64>, GroupError>;

    /// Whether this worker receives reduction results
    fn is_designated(&self) -> bool {
        self.rank() == DESIGNATED_RANK
    }

    /// Sum-reduce `value` across the group
    fn reduce_sum(&mut self, value: f64) -> Result<Option<f64>, GroupError> {
        self.reduce(ReduceOp::Sum, value)
    }

    /// Max-reduce `value` across the group
    fn reduce_max(&mut self, value: f64) -> Result<Option<f64>, GroupError> {
        self.reduce(ReduceOp::Max, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        for op in [ReduceOp::Sum, ReduceOp::Max] {
            for v in [-2.5, 0.0, 3.14, 1e300] {
                assert_eq!(op.combine(op.identity(), v), v);
            }
        }
    }

    #[test]
    fn test_fold_sum() {
        assert_eq!(ReduceOp::Sum.fold([1.0, 2.0, 3.5]), 6.5);
        assert_eq!(ReduceOp::Sum.fold(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_fold_max() {
        assert_eq!(ReduceOp::Max.fold([0.2, 1.7, 0.9]), 1.7);
        assert_eq!(ReduceOp::Max.fold([5.0]), 5.0);
    }

    #[test]
    fn test_fold_single_value_is_identity() {
        let v = 3.141_592_653_5;
        assert_eq!(ReduceOp::Sum.fold([v]).to_bits(), v.to_bits());
    }
}
