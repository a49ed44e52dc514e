//! The replica-side contract the resolver depends on: key containment checks
//! and the local write path into the consensus log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{
    base::{Key, Span, SquallResult},
    wire::{BatchRequest, BatchResponse},
};

/// Signalled by the replica once a write command has been accepted into the
/// replication log. Applying the command comes later; a caller that only
/// needs "a retry will queue behind this write" can stop waiting here.
pub type ProposalSignal = oneshot::Sender<()>;

/// Describes the half-open key range `[start_key, end_key)` a replica is
/// responsible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: u64,
    pub start_key: Key,
    pub end_key: Key,
}

impl RangeDescriptor {
    pub fn new(range_id: u64, start_key: Key, end_key: Key) -> Self {
        Self {
            range_id,
            start_key,
            end_key,
        }
    }

    /// Whether `key` lies within this range.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.start_key.as_ref() <= key && key < self.end_key.as_ref()
    }

    /// Whether the half-open range `[start, end)` lies entirely within this
    /// range. Partial overlap does not count.
    pub fn contains_key_range(&self, start: &[u8], end: &[u8]) -> bool {
        self.start_key.as_ref() <= start && end <= self.end_key.as_ref() && start < end
    }

    /// This range's keyspace as a [`Span`].
    pub fn span(&self) -> Span {
        Span::range(self.start_key.clone(), self.end_key.clone())
    }
}

/// The narrow surface of a range replica the resolver uses.
///
/// The write path proposes the batch through the consensus log and returns
/// once it has been applied; `proposed` fires earlier, at log acceptance.
#[async_trait]
pub trait Replica: Send + Sync {
    /// The descriptor of the key range this replica serves.
    fn desc(&self) -> RangeDescriptor;

    fn contains_key(&self, key: &[u8]) -> bool {
        self.desc().contains_key(key)
    }

    fn contains_key_range(&self, start: &[u8], end: &[u8]) -> bool {
        self.desc().contains_key_range(start, end)
    }

    /// Submit a batch directly to this replica's write path. If `proposed` is
    /// given, it is signalled when the command is accepted into the log; on
    /// failure before that point the sender is dropped unsignalled.
    async fn add_write_cmd(
        &self,
        batch: BatchRequest,
        proposed: Option<ProposalSignal>,
    ) -> SquallResult<BatchResponse>;
}
