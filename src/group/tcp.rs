//! TCP process group
//!
//! Multi-process transport for a fixed-size group. The designated worker
//! (rank 0) listens on the coordinator address; every other rank connects to
//! it, introduces itself and waits until the whole group has joined.
//!
//! Collectives are a star: peers send their contribution to rank 0, which
//! folds them in rank order and then releases each peer. There are no retries
//! and no timeouts inside a collective; a lost connection is fatal.
//!
//! Formation also checks that every member was started with the same run
//! terms, and hands every peer the designated worker's seed base.
//!
//! The API is blocking. Each group owns a current-thread tokio runtime and
//! drives its sockets with `block_on`, so callers stay single-threaded.

use super::protocol::*;
use super::{GroupError, ProcessGroup, ReduceOp, DESIGNATED_RANK};
use crate::util::time::MonotonicClock;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Delay between connection attempts while the designated worker starts up
const JOIN_RETRY_INTERVAL: Duration = Duration::from_millis(50);

enum Links {
    /// Peer streams, indexed by `rank - 1`
    Designated { peers: Vec<TcpStream> },
    Peer { designated: TcpStream },
}

/// One member of a TCP group
pub struct TcpGroup {
    rank: usize,
    size: usize,
    clock: MonotonicClock,
    /// Seed base shared by the whole group
    seed_base: u64,
    /// Sequence number of the next collective
    seq: u64,
    runtime: Runtime,
    links: Links,
}

/// Bound but not yet formed designated endpoint
///
/// Splitting bind from formation lets callers learn the actual address
/// (e.g. after binding port 0) before peers are started.
pub struct TcpGroupListener {
    runtime: Runtime,
    listener: TcpListener,
    size: usize,
    terms: RunTerms,
    clock: MonotonicClock,
}

fn build_runtime() -> Result<Runtime, GroupError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Get node identifier (hostname)
fn node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

impl TcpGroupListener {
    /// Bind the designated worker's endpoint for a group of `size`
    ///
    /// Peers started with terms other than `terms` are rejected.
    pub fn bind(addr: &str, size: usize, terms: RunTerms) -> Result<Self, GroupError> {
        if size == 0 {
            return Err(GroupError::EmptyGroup);
        }

        let clock = MonotonicClock::new();
        let runtime = build_runtime()?;
        let listener = runtime.block_on(TcpListener::bind(addr))?;
        info!(addr = %listener.local_addr()?, size, "designated worker listening");

        Ok(Self {
            runtime,
            listener,
            size,
            terms,
            clock,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr, GroupError> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for every peer to join, then welcome them all with `seed_base`
    ///
    /// Fails if the group is not complete within `join_timeout` or if any
    /// peer's introduction is unacceptable.
    pub fn form(self, seed_base: u64, join_timeout: Duration) -> Result<TcpGroup, GroupError> {
        let Self {
            runtime,
            listener,
            size,
            terms,
            clock,
        } = self;
        let addr = listener.local_addr()?.to_string();

        let peers = runtime.block_on(async move {
            timeout(join_timeout, accept_peers(&listener, size, terms, seed_base))
                .await
                .unwrap_or_else(|_| {
                    Err(GroupError::JoinTimeout {
                        addr,
                        secs: join_timeout.as_secs(),
                    })
                })
        })?;
        info!(size, "group formed");

        Ok(TcpGroup {
            rank: DESIGNATED_RANK,
            size,
            clock,
            seed_base,
            seq: 0,
            runtime,
            links: Links::Designated { peers },
        })
    }
}

impl TcpGroup {
    /// Join a group of `size` as `rank`, coordinated at `addr`
    ///
    /// Rank 0 binds `addr` and waits for the others; every other rank
    /// connects to it, retrying until `join_timeout` elapses. Only rank 0's
    /// `seed_base` is used; peers adopt it when welcomed.
    pub fn join(
        rank: usize,
        size: usize,
        addr: &str,
        terms: RunTerms,
        seed_base: u64,
        join_timeout: Duration,
    ) -> Result<Self, GroupError> {
        if size == 0 {
            return Err(GroupError::EmptyGroup);
        }
        if rank >= size {
            return Err(GroupError::RankOutOfRange { rank, size });
        }

        if rank == DESIGNATED_RANK {
            return TcpGroupListener::bind(addr, size, terms)?.form(seed_base, join_timeout);
        }

        let clock = MonotonicClock::new();
        let runtime = build_runtime()?;
        let hello = HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            rank,
            size,
            terms,
            node_id: node_id(),
        };
        let (designated, welcome) =
            runtime.block_on(connect_to_designated(addr, hello, join_timeout))?;
        info!(rank, size, addr, seed_base = welcome.seed_base, "joined group");

        Ok(Self {
            rank,
            size,
            clock,
            seed_base: welcome.seed_base,
            seq: 0,
            runtime,
            links: Links::Peer { designated },
        })
    }
}

impl TcpGroup {
    /// Seed base every member derives its seed from
    pub fn seed_base(&self) -> u64 {
        self.seed_base
    }
}

impl ProcessGroup for TcpGroup {
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

        let runtime = &self.runtime;
        match &mut self.links {
            Links::Designated { peers } => runtime
                .block_on(gather(peers, seq, op, value))
                .map(Some),
            Links::Peer { designated } => runtime
                .block_on(contribute(designated, seq, op, value))
                .map(|()| None),
        }
    }
}

/// Validate a peer's introduction against the group being formed
fn check_hello(hello: &HelloMessage, size: usize, terms: &RunTerms) -> Result<(), GroupError> {
    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(GroupError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: hello.protocol_version,
        });
    }
    if hello.size != size {
        return Err(GroupError::Protocol(format!(
            "rank {} was started with group size {}, expected {}",
            hello.rank, hello.size, size
        )));
    }
    if hello.terms != *terms {
        return Err(GroupError::Protocol(format!(
            "rank {} was started with {:?}, expected {:?}",
            hello.rank, hello.terms, terms
        )));
    }
    if hello.rank == DESIGNATED_RANK {
        return Err(GroupError::Protocol(format!(
            "rank {} is reserved for the designated worker",
            DESIGNATED_RANK
        )));
    }
    if hello.rank >= size {
        return Err(GroupError::RankOutOfRange {
            rank: hello.rank,
            size,
        });
    }
    Ok(())
}

async fn accept_peers(
    listener: &TcpListener,
    size: usize,
    terms: RunTerms,
    seed_base: u64,
) -> Result<Vec<TcpStream>, GroupError> {
    let mut slots: Vec<Option<TcpStream>> = (1..size).map(|_| None).collect();

    for _ in 1..size {
        let (mut stream, from) = listener.accept().await?;
        stream.set_nodelay(true)?;

        let hello = match read_message(&mut stream).await? {
            Message::Hello(hello) => hello,
            other => {
                return Err(GroupError::Protocol(format!(
                    "expected HELLO from {}, got {:?}",
                    from, other
                )))
            }
        };

        let verdict = check_hello(&hello, size, &terms).and_then(|()| {
            if slots[hello.rank - 1].is_some() {
                Err(GroupError::Protocol(format!("rank {} joined twice", hello.rank)))
            } else {
                Ok(())
            }
        });
        if let Err(err) = verdict {
            let reject = Message::Reject(RejectMessage {
                reason: err.to_string(),
            });
            if let Err(e) = write_message(&mut stream, &reject).await {
                warn!(%from, error = %e, "failed to deliver REJECT");
            }
            return Err(err);
        }

        debug!(rank = hello.rank, node = %hello.node_id, %from, "peer joined");
        slots[hello.rank - 1] = Some(stream);
    }

    let mut peers = Vec::with_capacity(slots.len());
    for (i, slot) in slots.into_iter().enumerate() {
        let mut stream = slot.ok_or(GroupError::PeerLost(i + 1))?;
        let welcome = Message::Welcome(WelcomeMessage { size, seed_base });
        write_message(&mut stream, &welcome).await?;
        peers.push(stream);
    }
    Ok(peers)
}

async fn connect_to_designated(
    addr: &str,
    hello: HelloMessage,
    join_timeout: Duration,
) -> Result<(TcpStream, WelcomeMessage), GroupError> {
    let size = hello.size;
    let deadline = Instant::now() + join_timeout;
    let timed_out = || GroupError::JoinTimeout {
        addr: addr.to_string(),
        secs: join_timeout.as_secs(),
    };

    let mut stream = loop {
        match timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => break stream,
            Ok(Err(e)) if Instant::now() < deadline => {
                debug!(addr, error = %e, "designated worker not reachable yet");
                sleep(JOIN_RETRY_INTERVAL).await;
            }
            Ok(Err(_)) | Err(_) => return Err(timed_out()),
        }
    };
    stream.set_nodelay(true)?;

    write_message(&mut stream, &Message::Hello(hello)).await?;

    let reply = timeout_at(deadline, read_message(&mut stream))
        .await
        .map_err(|_| timed_out())??;
    match reply {
        Message::Welcome(welcome) if welcome.size == size => Ok((stream, welcome)),
        Message::Welcome(welcome) => Err(GroupError::Protocol(format!(
            "welcomed into a group of size {}, expected {}",
            welcome.size, size
        ))),
        Message::Reject(reject) => Err(GroupError::Rejected(reject.reason)),
        other => Err(GroupError::Protocol(format!(
            "expected WELCOME, got {:?}",
            other
        ))),
    }
}

/// Map a broken connection to the rank it belonged to
fn peer_lost(rank: usize, err: GroupError) -> GroupError {
    match err {
        GroupError::Io(e) => {
            debug!(rank, error = %e, "connection to peer failed");
            GroupError::PeerLost(rank)
        }
        other => other,
    }
}

async fn gather(
    peers: &mut [TcpStream],
    seq: u64,
    op: ReduceOp,
    value: f64,
) -> Result<f64, GroupError> {
    let mut acc = op.combine(op.identity(), value);

    for (i, stream) in peers.iter_mut().enumerate() {
        let rank = i + 1;
        match read_message(stream).await.map_err(|e| peer_lost(rank, e))? {
            Message::Contribute(c) if c.seq == seq && c.op == op => {
                acc = op.combine(acc, c.value);
            }
            other => {
                return Err(GroupError::Protocol(format!(
                    "rank {} sent {:?} during {:?} #{}",
                    rank, other, op, seq
                )))
            }
        }
    }

    for (i, stream) in peers.iter_mut().enumerate() {
        write_message(stream, &Message::Release(ReleaseMessage { seq }))
            .await
            .map_err(|e| peer_lost(i + 1, e))?;
    }

    Ok(acc)
}

async fn contribute(
    designated: &mut TcpStream,
    seq: u64,
    op: ReduceOp,
    value: f64,
) -> Result<(), GroupError> {
    let msg = Message::Contribute(ContributeMessage { seq, op, value });
    write_message(designated, &msg)
        .await
        .map_err(|e| peer_lost(DESIGNATED_RANK, e))?;

    match read_message(designated)
        .await
        .map_err(|e| peer_lost(DESIGNATED_RANK, e))?
    {
        Message::Release(release) if release.seq == seq => Ok(()),
        other => Err(GroupError::Protocol(format!(
            "expected RELEASE #{}, got {:?}",
            seq, other
        ))),
    }
}
