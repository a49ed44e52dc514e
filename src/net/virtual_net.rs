use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    base::{SquallError, SquallResult},
    net::ClusterClient,
    wire::{BatchRequest, BatchResponse, Request, Response},
};

type Handler = dyn Fn(&BatchRequest) -> SquallResult<BatchResponse> + Send + Sync;

/// An in-memory [`ClusterClient`] whose behavior is scripted by a handler
/// closure. Every dispatched batch is recorded, so a test can assert on
/// exactly what went over the wire.
pub struct VirtualCluster {
    handler: Box<Handler>,
    sent: Mutex<Vec<BatchRequest>>,
}

impl VirtualCluster {
    pub fn new(
        handler: impl Fn(&BatchRequest) -> SquallResult<BatchResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A cluster that acknowledges every non-push request. Push requests
    /// need a decision about the pushee and therefore a scripted handler.
    pub fn ack_all() -> Self {
        Self::new(ack_responses)
    }

    /// All batches dispatched so far, in order.
    pub fn sent(&self) -> Vec<BatchRequest> {
        self.sent.lock().expect("batch log lock poisoned").clone()
    }
}

/// Positional ack responses for a batch without push requests.
pub fn ack_responses(batch: &BatchRequest) -> SquallResult<BatchResponse> {
    let mut responses = Vec::with_capacity(batch.requests.len());
    for request in &batch.requests {
        responses.push(match request {
            Request::ResolveIntent(_) => Response::ResolveIntent,
            Request::ResolveIntentRange(_) => Response::ResolveIntentRange,
            Request::Gc(_) => Response::Gc,
            Request::PushTxn(_) => {
                return Err(SquallError::Other(
                    "virtual cluster has no script for push requests",
                ));
            }
        });
    }
    Ok(BatchResponse { responses })
}

#[async_trait]
impl ClusterClient for VirtualCluster {
    async fn run_with_response(&self, batch: BatchRequest) -> SquallResult<BatchResponse> {
        trace!(
            methods = ?batch.requests.iter().map(Request::method).collect::<Vec<_>>(),
            "virtual cluster dispatch"
        );
        let result = (self.handler)(&batch);
        self.sent
            .lock()
            .expect("batch log lock poisoned")
            .push(batch);
        result
    }
}
