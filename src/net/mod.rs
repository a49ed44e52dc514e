//! # Cluster Client
//!
//! This module contains the asynchronous abstraction over the cluster's
//! request router, to allow testing of components that dispatch batches
//! cluster-wide. The router splits a batch per key range and sends each
//! piece to the replica that owns it; responses come back in request order.

use async_trait::async_trait;

mod virtual_net;

pub use virtual_net::*;

use crate::{
    base::SquallResult,
    wire::{BatchRequest, BatchResponse},
};

/// A handle for sending request batches anywhere in the cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Dispatch a batch and collect the per-request responses.
    async fn run_with_response(&self, batch: BatchRequest) -> SquallResult<BatchResponse>;

    /// Dispatch a batch, discarding the per-request responses.
    async fn run(&self, batch: BatchRequest) -> SquallResult<()> {
        self.run_with_response(batch).await.map(|_| ())
    }
}
