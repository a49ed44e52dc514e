//! Intent resolution: deciding the fate of transactions whose provisional
//! writes block other requests, then cleaning those writes up.
//!
//! A request that runs into another transaction's intent cannot see or
//! overwrite the value until the owner is pushed (timestamp advanced or
//! aborted) or observed finalized. [`IntentResolver`] mediates this on the
//! synchronous request path and also drives the post-commit background
//! cleanup of whatever intents a finished transaction left behind.

use std::{collections::HashMap, sync::Arc};

use futures::future;
use itertools::{Either, Itertools};
use serde::{Deserialize, Serialize};
use tokio::{sync::oneshot, time::timeout};
use tracing::{Instrument, instrument};

use crate::{
    base::{ResolverConfig, Span, SquallError, SquallResult, WriteIntentError},
    ctrl::{HlcClock, HlcTimestamp},
    net::ClusterClient,
    range::{ProposalSignal, Replica},
    tasks::TaskPool,
    txn::{TransactionMeta, TransactionStatus, TxnId, make_priority, transaction_record_key},
    wire::{
        BatchRequest, BatchResponse, GcRequest, Method, PushTxnRequest, PushType, Request,
        RequestHeader, ResolveIntentRangeRequest, ResolveIntentRequest, Response,
    },
};


/// A provisional, transaction-tagged versioned write awaiting its owner's
/// commit or abort. Readers and writers that observe a pending intent must
/// push the owner or block; no value may be surfaced past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub span: Span,
    pub txn: TransactionMeta,
    pub status: TransactionStatus,
}

/// The intents that blocked a request, plus the context needed to decide what
/// the blocked client should do next.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub intents: Vec<Intent>,
    /// The blocked request's method.
    pub method: Method,
    /// The blocked request's header, carrying its transaction (if any), its
    /// read timestamp and its user priority.
    pub header: RequestHeader,
    pub read_only: bool,
}

/// Intents queued for background cleanup after the command that surfaced
/// them has finished. Owned copies: the originating batch may be retried
/// concurrently with this cleanup.
#[derive(Debug, Clone)]
pub struct QueuedIntents {
    /// The method of the request that surfaced the intents.
    pub origin: Method,
    pub intents: Vec<Intent>,
}

/// Manages the process of pushing transactions and resolving intents.
///
/// Owned by the store; the clock, cluster client and task pool are the
/// store's. Cloning is cheap and shares all state, which is how background
/// tasks carry the resolver across spawn points.
#[derive(Clone)]
pub struct IntentResolver {
    clock: Arc<HlcClock>,
    db: Arc<dyn ClusterClient>,
    pool: Arc<TaskPool>,
    config: ResolverConfig,
}

impl IntentResolver {
    pub fn new(
        clock: Arc<HlcClock>,
        db: Arc<dyn ClusterClient>,
        pool: Arc<TaskPool>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            clock,
            db,
            pool,
            config,
        }
    }

    /// Try to push the conflicting transaction(s) responsible for the given
    /// conflict report, and to resolve their intents if possible. Returns the
    /// error to hand back to the blocked client in place of the original
    /// conflict.
    ///
    /// The returned error is either the conflict re-stated with its
    /// `resolved` flag governing the client's retry behavior (retry
    /// immediately when `true`, back off when `false`), or the push failure
    /// itself when the caller is a writing transaction that cannot make
    /// progress by waiting.
    #[instrument(skip_all, fields(method = %report.method, intents = report.intents.len()))]
    pub async fn process_write_intent_error(
        &self,
        replica: &Arc<dyn Replica>,
        report: ConflictReport,
        push_type: PushType,
    ) -> SquallError {
        trace!("resolving write intent conflict");

        let ConflictReport {
            intents,
            method,
            header,
            read_only,
        } = report;

        let (resolve_intents, push_err) = self
            .maybe_push_transactions(intents.clone(), &header, push_type)
            .await;

        if let Err(err) = self
            .resolve_intents(replica, resolve_intents, false, true)
            .await
        {
            // When resolving without waiting, errors should not usually be
            // returned here, although they may be while the store is in the
            // process of shutting down. The client retries either way.
            warn!("asynchronous intent resolution failed: {}", err);
        }

        if let Some(push_err) = push_err {
            trace!(%method, "push failed: {}", push_err);

            // A writer inside a transaction cannot make progress by simply
            // resending; propagate the push failure so the client restarts
            // its transaction.
            if header.txn.is_some() && !read_only {
                return push_err;
            }

            // Readers and non-transactional writers only need to resend with
            // a backoff; `resolved` stays unset to engage it.
            return SquallError::WriteIntent(WriteIntentError {
                intents,
                resolved: false,
            });
        }

        // Every owning transaction was pushed, so tell the client everything
        // is resolved and it can retry immediately.
        SquallError::WriteIntent(WriteIntentError {
            intents,
            resolved: true,
        })
    }

    /// Try to push the transactions that own the given intents: advance the
    /// owner's timestamp on a read/write conflict, abort it on a write/write
    /// conflict, or do nothing if the owner is no longer pending.
    ///
    /// Returns the intents that can now be resolved, and the push error if
    /// one occurred. The returned intents should be resolved regardless of
    /// the error; with a non-`None` error some of the conflicting
    /// transactions may still be pending, and only the intents whose owners
    /// were already finalized come back.
    #[instrument(skip_all, fields(intents = intents.len(), push_type = %push_type))]
    pub async fn maybe_push_transactions(
        &self,
        intents: Vec<Intent>,
        header: &RequestHeader,
        push_type: PushType,
    ) -> (Vec<Intent>, Option<SquallError>) {
        // Split intents into those we need to push and those which are good
        // to resolve as-is.
        let (push_intents, mut resolve_intents): (Vec<Intent>, Vec<Intent>) =
            intents.into_iter().partition_map(|intent| {
                if intent.status.is_finalized() {
                    Either::Right(intent)
                } else {
                    Either::Left(intent)
                }
            });

        if push_intents.is_empty() {
            return (resolve_intents, None);
        }
        trace!(pushes = push_intents.len(), "pushing intent owners");

        // The observation has to come from the clock, not from the request's
        // timestamp: a retry resends the same request timestamp, and a fixed
        // "now" would never let an abandoned transaction time out.
        let now = self.clock.now();

        // If there is no pusher transaction, communicate a priority by
        // synthesizing a pusher with only the priority set.
        let pusher = match &header.txn {
            Some(txn) => txn.clone(),
            None => TransactionMeta::with_priority(make_priority(header.user_priority)),
        };

        // Several intents may share an owner; push each distinct transaction
        // once. Every extra push of the same pushee would ratchet its
        // priority up a little further.
        let mut batch = BatchRequest::default();
        let mut pushee_slot: HashMap<TxnId, usize> = HashMap::new();
        for intent in &push_intents {
            if pushee_slot.contains_key(&intent.txn.id) {
                continue;
            }
            pushee_slot.insert(intent.txn.id, batch.requests.len());
            batch.add(Request::PushTxn(PushTxnRequest {
                span: Span::point(intent.txn.key.clone()),
                pusher: pusher.clone(),
                pushee: intent.txn.clone(),
                push_to: header.timestamp,
                now,
                push_type,
            }));
        }

        let response = match self.db.run_with_response(batch).await {
            Ok(response) => response,
            Err(err) => {
                // The push batch failed as a unit. The intents whose owners
                // were already finalized can still be cleaned up.
                return (resolve_intents, Some(err));
            }
        };

        for mut intent in push_intents {
            let slot = pushee_slot[&intent.txn.id];
            let Some(Response::PushTxn(push)) = response.responses.get(slot) else {
                return (
                    resolve_intents,
                    Some(SquallError::Other("push response missing or mistyped")),
                );
            };
            // Copy the authoritative record state into the intent: terminal
            // status, or still pending with its timestamp pushed forward.
            intent.txn = push.pushee.meta.clone();
            intent.status = push.pushee.status;
            resolve_intents.push(intent);
        }

        (resolve_intents, None)
    }

    /// Resolve the given intents. Intents local to the replica are submitted
    /// directly to its write path; all non-local intents are sent through the
    /// cluster client as one batch.
    ///
    /// If `wait` is true, all operations are carried out synchronously and an
    /// error is returned. Otherwise the work is scheduled in the background
    /// and the call returns as soon as the local batch has been **proposed**
    /// (not applied) to the consensus log. This ensures that a waiting client
    /// retrying immediately after this function will not hit the same intents
    /// on this replica again; background failures are only logged.
    ///
    /// `poison` is carried verbatim into every resolve request and marks the
    /// owner's replay-protection cache entries on the affected ranges.
    #[instrument(skip_all, fields(intents = intents.len(), wait, poison))]
    pub async fn resolve_intents(
        &self,
        replica: &Arc<dyn Replica>,
        intents: Vec<Intent>,
        wait: bool,
        poison: bool,
    ) -> SquallResult<()> {
        let mut local = BatchRequest::default();
        let mut remote = BatchRequest::default();

        for intent in intents {
            // Partial containment counts as non-local: the router has to
            // split such a resolve across ranges.
            let is_local = match &intent.span.end_key {
                None => replica.contains_key(&intent.span.key),
                Some(end_key) => replica.contains_key_range(&intent.span.key, end_key),
            };
            let request = if intent.span.is_point() {
                Request::ResolveIntent(ResolveIntentRequest {
                    span: intent.span,
                    intent_txn: intent.txn,
                    status: intent.status,
                    poison,
                })
            } else {
                Request::ResolveIntentRange(ResolveIntentRangeRequest {
                    span: intent.span,
                    intent_txn: intent.txn,
                    status: intent.status,
                    poison,
                })
            };
            if is_local {
                local.add(request);
            } else {
                remote.add(request);
            }
        }

        if wait {
            // Carry out both batches on the caller and surface either
            // failure. The local batch goes directly into the replica's
            // consensus log; the remote one takes the router.
            let local_fut = async {
                if local.is_empty() {
                    return Ok(());
                }
                run_local_batch(replica, local, None, &self.config)
                    .await
                    .map(|_| ())
            };
            let remote_fut = async {
                if remote.is_empty() {
                    return Ok(());
                }
                self.db.run(remote).await
            };
            future::try_join(local_fut, remote_fut).await?;
            return Ok(());
        }

        // From here on the cleanup runs in the background and only the local
        // proposal is awaited.
        let mut proposed_rx = None;
        if !local.is_empty() {
            let (proposed_tx, rx) = oneshot::channel();
            let task = {
                let replica = Arc::clone(replica);
                let local = local.clone();
                let config = self.config.clone();
                async move {
                    if let Err(err) =
                        run_local_batch(&replica, local, Some(proposed_tx), &config).await
                    {
                        warn!("unable to resolve local intents: {}", err);
                    }
                }
                // Fresh span: this outlives the request that triggered it.
                .instrument(info_span!("resolve local intents"))
            };
            if self.pool.run_async_task(task) {
                proposed_rx = Some(rx);
            } else {
                // Still do the work when the pool is draining. Going async is
                // merely for latency; these intents may be blocking other
                // requests and must not be orphaned.
                run_local_batch(replica, local, None, &self.config).await?;
            }
        }

        // Resolve all of the intents which aren't local to the range.
        if !remote.is_empty() {
            let task = {
                let db = Arc::clone(&self.db);
                let remote = remote.clone();
                async move {
                    if let Err(err) = db.run(remote).await {
                        warn!("unable to resolve external intents: {}", err);
                    }
                }
                .instrument(info_span!("resolve external intents"))
            };
            if !self.pool.run_async_task(task) {
                // As with local intents, a draining pool means doing the
                // work on the caller rather than dropping it.
                self.db.run(remote).await?;
            }
        }

        // Wait until the local batch has been accepted into the log. No-op
        // if all intents were non-local. A dropped sender means the local
        // action failed before proposing; it has already logged the failure
        // and the client's retry will simply meet the intents again.
        if let Some(rx) = proposed_rx {
            let _ = rx.await;
        }
        Ok(())
    }

    /// Asynchronously process intents which were encountered during another
    /// command but did not interfere with its execution. This occurs in two
    /// cases: inconsistent reads, and a transaction's end queueing its
    /// remaining intents for cleanup.
    ///
    /// Each item is processed independently on a background task with a
    /// bounded deadline; no cross-item ordering is promised. When the task
    /// pool is draining, items are processed inline on the caller instead of
    /// being dropped.
    pub async fn process_intents_async(&self, replica: &Arc<dyn Replica>, items: Vec<QueuedIntents>) {
        if items.is_empty() {
            return;
        }
        let now = self.clock.now();

        for item in items {
            let task = {
                let resolver = self.clone();
                let replica = Arc::clone(replica);
                let item = item.clone();
                async move { resolver.process_one(&replica, item, now).await }
                    // Fresh span: this outlives the request that queued it.
                    .instrument(info_span!("process queued intents"))
            };
            if !self.pool.run_async_task(task) {
                self.process_one(replica, item, now).await;
            }
        }
    }

    /// Push (touch-only) and resolve one queued item under the network
    /// deadline. Everything here is best effort; give up rather than wait
    /// on a hanging peer forever.
    async fn process_one(&self, replica: &Arc<dyn Replica>, item: QueuedIntents, now: HlcTimestamp) {
        let deadline = self.config.network_timeout;
        let outcome = match timeout(deadline, self.cleanup_item(replica, item, now)).await {
            Ok(outcome) => outcome,
            Err(elapsed) => Err(SquallError::from(elapsed)),
        };
        if let Err(err) = outcome {
            warn!("queued intent cleanup failed: {}", err);
        }
    }

    async fn cleanup_item(
        &self,
        replica: &Arc<dyn Replica>,
        item: QueuedIntents,
        now: HlcTimestamp,
    ) -> SquallResult<()> {
        let owner = item.intents.first().map(|intent| intent.txn.clone());
        let header = RequestHeader {
            timestamp: now,
            ..Default::default()
        };

        // A touch push resolves the intents whose owners already finished
        // and forces no progress on the rest.
        let (resolve_intents, push_err) = self
            .maybe_push_transactions(item.intents, &header, PushType::Touch)
            .await;

        // These intents were observed out-of-line with the owning
        // transaction's commit, so this path lacks the assurance that makes
        // poisoning necessary; the home range's replay cache was already
        // cleared synchronously with the transaction's end.
        self.resolve_intents(replica, resolve_intents, true, false)
            .await?;

        if let Some(err) = push_err {
            return Err(err);
        }

        // The intents are fully resolved, so the transaction record can be
        // deleted right away.
        if item.origin == Method::EndTransaction {
            let Some(txn) = owner else {
                return Ok(());
            };
            let desc = replica.desc();
            let mut batch = BatchRequest::default();
            batch.add(Request::Gc(GcRequest {
                span: desc.span(),
                keys: vec![transaction_record_key(&txn.key, txn.id)],
            }));
            if let Err(err) = replica.add_write_cmd(batch, None).await {
                warn!("could not GC completed transaction: {}", err);
            }
        }
        Ok(())
    }
}

/// Submit a batch to the replica's write path under the network deadline. A
/// stalled quorum must not pin the caller (or a background task) forever.
async fn run_local_batch(
    replica: &Arc<dyn Replica>,
    batch: BatchRequest,
    proposed: Option<ProposalSignal>,
    config: &ResolverConfig,
) -> SquallResult<BatchResponse> {
    Ok(timeout(config.network_timeout, replica.add_write_cmd(batch, proposed)).await??)
}
