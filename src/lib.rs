use std::sync::Arc;

use crate::{
    base::ResolverConfig,
    ctrl::HlcClock,
    net::ClusterClient,
    resolve::IntentResolver,
    tasks::TaskPool,
};

#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate tracing;

pub mod base;
pub mod ctrl;
pub mod net;
pub mod range;
pub mod resolve;
pub mod tasks;
pub mod txn;
pub mod wire;

/// Store implementation: the per-node container for the services its range
/// replicas share.
///
/// ## Components
///
/// - a hybrid logical [`clock`], the source of every timestamp the store
///   hands out,
/// - the cluster [`db`] handle, through which batches reach any range in the
///   cluster,
/// - the background task [`pool`], drained on shutdown,
/// - the [`intent_resolver`], which mediates conflicts between requests and
///   the provisional writes of in-progress transactions.
///
/// ## Conflict dataflow
///
/// A request that hits another transaction's intent produces a conflict
/// report, which the resolver turns into pushes against the owning
/// transactions and then into cleanup of the now-decided intents. A
/// transaction that finishes queues its remaining intents for background
/// cleanup through the same resolver.
///
/// [`clock`]: Self::clock
/// [`db`]: Self::db
/// [`pool`]: Self::pool
/// [`intent_resolver`]: Self::intent_resolver
pub struct Store {
    clock: Arc<HlcClock>,
    db: Arc<dyn ClusterClient>,
    pool: Arc<TaskPool>,
    resolver: IntentResolver,
}

impl Store {
    pub fn new(db: Arc<dyn ClusterClient>, config: ResolverConfig) -> Self {
        let clock = Arc::new(HlcClock::new());
        let pool = TaskPool::new();
        let resolver = IntentResolver::new(
            Arc::clone(&clock),
            Arc::clone(&db),
            Arc::clone(&pool),
            config,
        );
        Self {
            clock,
            db,
            pool,
            resolver,
        }
    }

    pub fn clock(&self) -> &Arc<HlcClock> {
        &self.clock
    }

    pub fn db(&self) -> &Arc<dyn ClusterClient> {
        &self.db
    }

    pub fn intent_resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    /// Stop accepting background work and wait for in-flight tasks.
    pub async fn drain(&self) {
        self.pool.drain().await;
    }
}
