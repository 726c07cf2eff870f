//! Background validation worker. The worker task owns the pure
//! validator; callers talk to it over channels only. Responses are
//! routed back to the awaiting caller by correlation id, and every
//! request carries its own timeout.

use fieldsync_protocol::{validate_pair, FieldType, ValidationResult};
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const CHANNEL_DEPTH: usize = 64;

#[derive(Debug)]
struct ValidationRequest {
    id: u64,
    source: FieldType,
    target: FieldType,
}

#[derive(Debug)]
struct ValidationResponse {
    id: u64,
    result: ValidationResult,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ValidationResult>>>>;

pub struct ValidationWorker {
    request_tx: mpsc::Sender<ValidationRequest>,
    pending: PendingMap,
    next_id: AtomicU64,
    timeout: Duration,
}

impl ValidationWorker {
    /// Spawn the worker and router tasks. Both wind down once the
    /// handle is dropped and the channels close.
    #[must_use]
    pub fn start(timeout: Duration) -> Self {
        let (request_tx, mut request_rx) = mpsc::channel::<ValidationRequest>(CHANNEL_DEPTH);
        let (response_tx, mut response_rx) = mpsc::channel::<ValidationResponse>(CHANNEL_DEPTH);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(async move {
            while let Some(request) = request_rx.recv().await {
                let response = ValidationResponse {
                    id: request.id,
                    result: validate_pair(request.source, request.target),
                };
                if response_tx.send(response).await.is_err() {
                    break;
                }
            }
        });

        let router_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(response) = response_rx.recv().await {
                let waiter = router_pending
                    .lock()
                    .expect("pending mutex poisoned")
                    .remove(&response.id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response.result);
                    }
                    None => warn!("Dropping validation response with stale id {}", response.id),
                }
            }
        });

        Self {
            request_tx,
            pending,
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Submit a pair for validation and await the correlated response.
    /// Worker loss or a timeout yields a failed result, never a hang.
    pub async fn validate(&self, source: FieldType, target: FieldType) -> ValidationResult {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .insert(id, tx);

        let request = ValidationRequest { id, source, target };
        if self.request_tx.send(request).await.is_err() {
            self.forget(id);
            return ValidationResult::invalid("Validation worker is not running");
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.forget(id);
                ValidationResult::invalid("Validation worker dropped the request")
            }
            Err(_) => {
                self.forget(id);
                ValidationResult::invalid("Validation timed out")
            }
        }
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(&id);
    }
}
