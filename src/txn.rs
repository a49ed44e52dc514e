//! Transaction identity and record-state types.
//!
//! The resolver never reads or writes transaction records itself; it only
//! carries the minimal identity of a transaction around and interprets the
//! authoritative state a push response reports back.

use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    base::{Key, Ns, UserPriority},
    ctrl::HlcTimestamp,
};

/// Unique identity of a transaction.
pub type TxnId = Uuid;

/// The state of a transaction record. `Committed` and `Aborted` are terminal.
// These values are part of the wire format and shall never be changed.
#[repr(u8)]
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
pub enum TransactionStatus {
    Pending = 0,
    Committed = 1,
    Aborted = 2,
}

impl TransactionStatus {
    /// Whether the transaction has reached a terminal state.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Minimal identity of a transaction: enough to find its record and to take
/// part in priority tie-breaks. Two metas refer to the same transaction iff
/// their `id`s match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMeta {
    pub id: TxnId,
    /// Anchor key: the location of the transaction's record.
    pub key: Key,
    pub epoch: u32,
    /// The transaction's provisional commit timestamp.
    pub timestamp: HlcTimestamp,
    pub priority: i32,
}

impl TransactionMeta {
    /// Synthesize a pusher identity for a caller that is not running inside a
    /// transaction. Only the priority is meaningful; it still lets the caller
    /// participate in the priority tie-break against a real pushee.
    pub fn with_priority(priority: i32) -> Self {
        Self {
            id: Uuid::nil(),
            key: Key::new(),
            epoch: 0,
            timestamp: HlcTimestamp::ZERO,
            priority,
        }
    }
}

/// A transaction's identity together with its authoritative record state, as
/// reported by a push response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub meta: TransactionMeta,
    pub status: TransactionStatus,
}

/// Spread of the random component of a synthesized priority.
const PRIORITY_SPREAD: i32 = 100_000;

/// Derive a transaction priority from a user priority.
///
/// The random component breaks ties between callers at the same user
/// priority; the user priority scales it, so a priority-10 caller beats a
/// priority-1 caller in expectation but not deterministically.
pub fn make_priority(user_priority: UserPriority) -> i32 {
    let scale = if user_priority.0 > 0.0 {
        user_priority.0
    } else {
        UserPriority::default().0
    };
    let base = rand::thread_rng().gen_range(1..=PRIORITY_SPREAD);
    (base as f64 * scale).min(i32::MAX as f64) as i32
}

/// The key of a transaction's record: the record namespace byte, the anchor
/// key null-terminated, then the transaction id.
pub fn transaction_record_key(anchor: &[u8], id: TxnId) -> Key {
    let mut buf = BytesMut::with_capacity(1 + anchor.len() + 1 + 16);
    buf.put_u8(Ns::Record.into());
    buf.put(anchor);
    buf.put_u8(0);
    buf.put(id.as_bytes().as_slice());
    buf.freeze()
}
