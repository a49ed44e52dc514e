//! Request and response shapes of the store's internal wire protocol, as far
//! as the intent resolver produces and consumes them. The RPC layer that
//! encodes and routes them lives behind [`ClusterClient`].
//!
//! [`ClusterClient`]: crate::net::ClusterClient

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    base::{Key, Span, UserPriority},
    ctrl::HlcTimestamp,
    txn::{Transaction, TransactionMeta, TransactionStatus},
};

/// The operation a request performs. Only the methods the resolver produces
/// or inspects are listed here.
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
pub enum Method {
    Get = 0,
    Put = 1,
    Scan = 2,
    EndTransaction = 3,
    PushTxn = 4,
    ResolveIntent = 5,
    ResolveIntentRange = 6,
    Gc = 7,
}

/// What a push attempts to do to the pushee.
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
pub enum PushType {
    /// Advance the pushee's commit timestamp past the pusher's read
    /// timestamp. Used by readers.
    Timestamp = 0,
    /// Abort the pushee. Used by writers.
    Abort = 1,
    /// Probe only: succeeds iff the pushee is already finalized or abandoned,
    /// never forces progress. Used by post-commit cleanup.
    Touch = 2,
}

/// Header shared by every request in a batch: who is asking and at what
/// timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestHeader {
    /// The read timestamp of the request.
    pub timestamp: HlcTimestamp,
    /// The caller's transaction, if it runs inside one.
    pub txn: Option<TransactionMeta>,
    /// Priority for callers outside a transaction.
    pub user_priority: UserPriority,
}

/// Asks the range holding the pushee's transaction record to decide the
/// pushee's fate: advance its timestamp, abort it, or report it finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTxnRequest {
    /// The pushee's transaction-record anchor key; routes the request.
    pub span: Span,
    pub pusher: TransactionMeta,
    pub pushee: TransactionMeta,
    /// The timestamp the pushee must end up above (for [`PushType::Timestamp`]).
    pub push_to: HlcTimestamp,
    /// The pusher's current wall-clock observation. Must advance across
    /// retries so an abandoned pushee is eventually detected as timed out.
    pub now: HlcTimestamp,
    pub push_type: PushType,
}

/// The authoritative outcome of a push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTxnResponse {
    pub pushee: Transaction,
}

/// Rewrites or removes a single-key intent according to the owning
/// transaction's now-known state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveIntentRequest {
    pub span: Span,
    pub intent_txn: TransactionMeta,
    pub status: TransactionStatus,
    /// Poison the replay-protection cache for the intent's transaction on
    /// this range while cleaning up.
    pub poison: bool,
}

/// Like [`ResolveIntentRequest`], over a key range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveIntentRangeRequest {
    pub span: Span,
    pub intent_txn: TransactionMeta,
    pub status: TransactionStatus,
    pub poison: bool,
}

/// Deletes the given keys, used here for transaction records after their
/// intents have been cleaned up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcRequest {
    /// The keyspace of the replica executing the GC.
    pub span: Span,
    pub keys: Vec<Key>,
}

/// A request the resolver can put into a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    PushTxn(PushTxnRequest),
    ResolveIntent(ResolveIntentRequest),
    ResolveIntentRange(ResolveIntentRangeRequest),
    Gc(GcRequest),
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::PushTxn(_) => Method::PushTxn,
            Request::ResolveIntent(_) => Method::ResolveIntent,
            Request::ResolveIntentRange(_) => Method::ResolveIntentRange,
            Request::Gc(_) => Method::Gc,
        }
    }
}

/// Per-request responses, positionally aligned with the batch's requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    PushTxn(PushTxnResponse),
    ResolveIntent,
    ResolveIntentRange,
    Gc,
}

/// An ordered collection of requests dispatched as one unit. The router may
/// split it per range, but responses come back in request order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    pub header: RequestHeader,
    pub requests: Vec<Request>,
}

impl BatchRequest {
    pub fn add(&mut self, request: Request) {
        self.requests.push(request);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub responses: Vec<Response>,
}
