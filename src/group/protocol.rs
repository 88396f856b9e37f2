//! Group wire protocol
//!
//! Messages exchanged between the designated worker and its peers in a TCP
//! group. The protocol uses MessagePack (rmp-serde) for compact binary
//! serialization.
//!
//! # Message Flow
//!
//! ```text
//! Peer (rank r)                   Designated (rank 0)
//!     |                              |
//!     |-------- HELLO -------------->|
//!     |         ... rank 0 waits for every peer ...
//!     |<------- WELCOME / REJECT ----|
//!     |                              |
//!     |-- CONTRIBUTE(seq, op, v) --->|
//!     |         ... rank 0 folds all contributions ...
//!     |<------- RELEASE(seq) --------|
//!     |                              |
//!     |   (one CONTRIBUTE/RELEASE pair per collective)
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use super::{GroupError, ReduceOp};
use crate::config::RunConfig;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// All members of a group must agree on it.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame accepted from the network
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Hello(HelloMessage),
    Welcome(WelcomeMessage),
    Reject(RejectMessage),
    Contribute(ContributeMessage),
    Release(ReleaseMessage),
}

/// Run settings every member of a group must share
///
/// A member sampling a different total, or issuing a different number of
/// collectives, would corrupt the result or stall the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTerms {
    pub total_samples: u64,
    pub timing: bool,
}

impl From<&RunConfig> for RunTerms {
    fn from(config: &RunConfig) -> Self {
        Self {
            total_samples: config.total_samples,
            timing: config.timing,
        }
    }
}

/// Sent by a peer right after connecting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub protocol_version: u32,

    /// Rank the peer claims
    pub rank: usize,

    /// Group size the peer was started with
    pub size: usize,

    /// Run settings the peer was started with
    pub terms: RunTerms,

    /// Host name, for diagnostics
    pub node_id: String,
}

/// Sent to every peer once the whole group has joined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub size: usize,

    /// Seed base of the designated worker, adopted by every peer
    pub seed_base: u64,
}

/// Sent instead of WELCOME when a HELLO is not acceptable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectMessage {
    pub reason: String,
}

/// One member's input to a collective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributeMessage {
    /// Collective sequence number, starting at 0
    pub seq: u64,
    pub op: ReduceOp,
    pub value: f64,
}

/// Lets a peer leave collective `seq`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseMessage {
    pub seq: u64,
}

/// Serialize a message with its length prefix
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, GroupError> {
    let msg_bytes = rmp_serde::to_vec(msg)?;

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize one framed message from the front of `buf`
///
/// Returns `(message, bytes_consumed)` where bytes_consumed includes the
/// length prefix.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize), GroupError> {
    if buf.len() < 4 {
        return Err(GroupError::Protocol(format!(
            "buffer too small for message length (need 4 bytes, got {})",
            buf.len()
        )));
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if buf.len() < 4 + msg_len {
        return Err(GroupError::Protocol(format!(
            "incomplete message (need {} bytes, got {})",
            4 + msg_len,
            buf.len()
        )));
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len])?;
    Ok((msg, 4 + msg_len))
}

/// Read one complete message from a stream
pub async fn read_message<R>(stream: &mut R) -> Result<Message, GroupError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_LEN {
        return Err(GroupError::Protocol(format!(
            "message too large: {} bytes (max {})",
            msg_len, MAX_MESSAGE_LEN
        )));
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream.read_exact(&mut msg_buf).await?;

    Ok(rmp_serde::from_slice(&msg_buf)?)
}

/// Write one message to a stream and flush it
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<(), GroupError>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}
