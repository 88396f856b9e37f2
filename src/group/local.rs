//! In-process process group
//!
//! Each member is meant to be driven by its own thread. Members talk over
//! crossbeam channels: peers send contributions to the designated worker,
//! which folds them in rank order and then releases every peer. No peer
//! returns from a reduction before all contributions have arrived.

use super::{GroupError, ProcessGroup, ReduceOp, DESIGNATED_RANK};
use crate::util::time::MonotonicClock;
use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::trace;

#[derive(Debug)]
struct Contribution {
    rank: usize,
    seq: u64,
    op: ReduceOp,
    value: f64,
}

enum Role {
    Designated {
        inbox: Receiver<Contribution>,
        /// Release channels, indexed by `rank - 1`
        releases: Vec<Sender<u64>>,
    },
    Peer {
        to_designated: Sender<Contribution>,
        released: Receiver<u64>,
    },
}

/// One member of an in-process group
pub struct LocalGroup {
    rank: usize,
    size: usize,
    clock: MonotonicClock,
    /// Sequence number of the next collective
    seq: u64,
    role: Role,
}

impl LocalGroup {
    /// Create every member of a group of `size`, ordered by rank
    ///
    /// All members share one clock epoch.
    pub fn create(size: usize) -> Result<Vec<LocalGroup>, GroupError> {
        if size == 0 {
            return Err(GroupError::EmptyGroup);
        }

        let clock = MonotonicClock::new();
        let (to_designated, inbox) = unbounded();

        let mut releases = Vec::with_capacity(size - 1);
        let mut peers = Vec::with_capacity(size - 1);
        for rank in 1..size {
            let (release_tx, release_rx) = unbounded();
            releases.push(release_tx);
            peers.push(LocalGroup {
                rank,
                size,
                clock,
                seq: 0,
                role: Role::Peer {
                    to_designated: to_designated.clone(),
                    released: release_rx,
                },
            });
        }

        let mut members = Vec::with_capacity(size);
        members.push(LocalGroup {
            rank: DESIGNATED_RANK,
            size,
            clock,
            seq: 0,
            role: Role::Designated { inbox, releases },
        });
        members.extend(peers);
        Ok(members)
    }
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn wtime(&self) -> f64 {
        self.clock.wtime()
    }

    fn reduce(&mut self, op: ReduceOp, value: f64) -> Result<Option<f64>, GroupError> {
        let seq = self.seq;
        self.seq += 1;

        match &self.role {
            Role::Designated { inbox, releases } => {
                let mut values: Vec<Option<f64>> = vec![None; self.size];
                values[DESIGNATED_RANK] = Some(value);

                for _ in 1..self.size {
                    let contribution = inbox.recv().map_err(|_| {
                        let missing = values.iter().position(Option::is_none).unwrap_or(0);
                        GroupError::PeerLost(missing)
                    })?;
                    trace!(?contribution, "contribution received");

                    if contribution.seq != seq || contribution.op != op {
                        return Err(GroupError::Protocol(format!(
                            "rank {} sent {:?} #{} during {:?} #{}",
                            contribution.rank, contribution.op, contribution.seq, op, seq
                        )));
                    }
                    let slot = values.get_mut(contribution.rank).ok_or(
                        GroupError::RankOutOfRange {
                            rank: contribution.rank,
                            size: self.size,
                        },
                    )?;
                    if slot.is_some() {
                        return Err(GroupError::Protocol(format!(
                            "rank {} contributed twice to #{}",
                            contribution.rank, seq
                        )));
                    }
                    *slot = Some(contribution.value);
                }

                let result = op.fold(values.into_iter().flatten());

                for (i, release) in releases.iter().enumerate() {
                    release.send(seq).map_err(|_| GroupError::PeerLost(i + 1))?;
                }
                Ok(Some(result))
            }
            Role::Peer {
                to_designated,
                released,
            } => {
                to_designated
                    .send(Contribution {
                        rank: self.rank,
                        seq,
                        op,
                        value,
                    })
                    .map_err(|_| GroupError::PeerLost(DESIGNATED_RANK))?;

                let released_seq = released
                    .recv()
                    .map_err(|_| GroupError::PeerLost(DESIGNATED_RANK))?;
                if released_seq != seq {
                    return Err(GroupError::Protocol(format!(
                        "released from #{} while waiting on #{}",
                        released_seq, seq
                    )));
                }
                Ok(None)
            }
        }
    }
}
