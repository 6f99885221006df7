//! Operation manager (ยง4.2): outstanding-request registry with correlation,
//! bounded concurrency, timeouts and retries. Mirrors the waiting-queue /
//! active-map split of the websocket request manager this client's
//! connection driver is grounded on, generalized to the spec's retry and
//! reconnect-survival rules.

use super::types::{Disposition, Operation, OperationState};
use crate::{error::OperationError, package::Package};
use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Diagnostic counters surfaced through `tracing` span fields (ยง3A), not a
/// metrics layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct OperationCounters {
    pub dispatched: u64,
    pub completed: u64,
    pub retried: u64,
    pub timed_out: u64,
    pub stale_discarded: u64,
}

pub struct OperationManager {
    waiting: VecDeque<Operation>,
    active: HashMap<Uuid, Operation>,
    max_queue_size: usize,
    max_concurrent: usize,
    counters: OperationCounters,
}

impl OperationManager {
    pub fn new(max_queue_size: usize, max_concurrent: usize) -> Self {
        Self {
            waiting: VecDeque::new(),
            active: HashMap::new(),
            max_queue_size,
            max_concurrent,
            counters: OperationCounters::default(),
        }
    }

    pub fn counters(&self) -> OperationCounters {
        self.counters
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Enrolls a new operation in the waiting queue. If the waiting queue is
    /// already at `maxOperationQueueSize`, `op`'s completion sink is resolved
    /// with `OperationQueueOverflow` right here, per ยง7's rule that no error
    /// ever crosses an API boundary except through the completion sink.
    pub fn enqueue(&mut self, mut op: Operation) -> Result<(), OperationError> {
        if self.waiting.len() >= self.max_queue_size {
            op.complete(Err(OperationError::OperationQueueOverflow));
            return Err(OperationError::OperationQueueOverflow);
        }
        self.waiting.push_back(op);
        Ok(())
    }

    /// Pops as many waiting operations as the concurrency bound allows,
    /// serializing each into a package to write to the transport. Per ยง4.2,
    /// only called while the connection phase is `Connected`.
    pub fn schedule_waiting(&mut self) -> Vec<Package> {
        let mut ready = Vec::new();
        while self.active.len() < self.max_concurrent {
            let Some(mut op) = self.waiting.pop_front() else { break };
            op.state = OperationState::InProgress;
            op.last_attempt = Some(Instant::now());
            let pkg = op.to_package();
            self.counters.dispatched += 1;
            self.active.insert(op.correlation_id, op);
            ready.push(pkg);
        }
        ready
    }

    /// Returns a package to the front of the waiting queue, e.g. after a
    /// failed transport write.
    pub fn requeue_front(&mut self, correlation_id: Uuid) {
        if let Some(mut op) = self.active.remove(&correlation_id) {
            op.state = OperationState::Pending;
            self.waiting.push_front(op);
        }
    }

    /// Dispatches a response by correlation id. Returns `true` if the id
    /// belonged to an operation (whether or not it was handled to
    /// completion); `false` means the caller should try the subscription
    /// manager next, per ยง4.2's response-dispatch rule.
    pub fn handle_response(&mut self, correlation_id: Uuid, package: &Package) -> bool {
        let Some(op) = self.active.get_mut(&correlation_id) else {
            return false;
        };

        match (op.inspector)(package) {
            Disposition::Success(payload) => {
                let mut op = self.active.remove(&correlation_id).unwrap();
                op.complete(Ok(payload));
                self.counters.completed += 1;
            }
            Disposition::Continue => {
                trace!(%correlation_id, "operation awaits further frames");
            }
            Disposition::Retry(reason) => {
                self.retry(correlation_id, reason);
            }
            Disposition::Reconnect { .. } => {
                // Caller (the connection driver) observes this via a
                // separate channel; here we just put the operation back to
                // waiting without penalizing its retry count.
                if let Some(mut op) = self.active.remove(&correlation_id) {
                    op.state = OperationState::Pending;
                    self.waiting.push_front(op);
                }
            }
            Disposition::Fail(err) => {
                let mut op = self.active.remove(&correlation_id).unwrap();
                op.complete(Err(err));
            }
        }
        true
    }

    fn retry(&mut self, correlation_id: Uuid, reason: String) {
        let Some(mut op) = self.active.remove(&correlation_id) else { return };
        op.retry_count += 1;
        let exceeded = op.max_retries.map(|max| op.retry_count > max).unwrap_or(false);
        if exceeded {
            debug!(%correlation_id, reason, "retry limit reached");
            op.complete(Err(OperationError::RetryLimitReached));
            return;
        }
        debug!(%correlation_id, reason, retry_count = op.retry_count, "retrying operation");
        self.counters.retried += 1;
        op.state = OperationState::Retrying;
        self.waiting.push_back(op);
    }

    /// Sweeps active operations for per-attempt timeout, per ยง4.2.
    pub fn check_timeouts(&mut self, fail_on_no_server_response: bool) {
        let now = Instant::now();
        let timed_out: Vec<Uuid> = self
            .active
            .iter()
            .filter(|(_, op)| {
                op.last_attempt.map(|t| now.duration_since(t) > op.timeout).unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in timed_out {
            self.counters.timed_out += 1;
            if fail_on_no_server_response {
                if let Some(mut op) = self.active.remove(&id) {
                    op.complete(Err(OperationError::OperationTimedOut));
                }
            } else {
                self.retry(id, "no server response".to_string());
            }
        }
    }

    /// Records a stale response: a correlation id the subscription manager
    /// also doesn't recognize. Never fatal; just a diagnostic.
    pub fn record_stale(&mut self) {
        self.counters.stale_discarded += 1;
        warn!("discarded response for unknown correlation id");
    }

    /// On entering `Reconnecting` (ยง4.2): active operations are *not*
    /// failed, they move back to waiting (retry count preserved) to be
    /// re-sent after reconnect.
    pub fn on_reconnecting(&mut self) {
        let active: Vec<Operation> = self.active.drain().map(|(_, op)| op).collect();
        for mut op in active {
            op.state = OperationState::Pending;
            self.waiting.push_front(op);
        }
    }

    /// On entering `Closed`: all waiting and active operations are failed
    /// with `ConnectionClosed`.
    pub fn on_closed(&mut self) {
        for mut op in self.waiting.drain(..) {
            op.complete(Err(OperationError::ConnectionClosed));
        }
        for (_, mut op) in self.active.drain() {
            op.complete(Err(OperationError::ConnectionClosed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::CommandTag;

    fn noop_operation(timeout: std::time::Duration) -> Operation {
        let (op, _rx) = Operation::new(
            CommandTag::HeartbeatRequest,
            vec![],
            timeout,
            Some(3),
            Box::new(|_pkg| Disposition::Success(vec![])),
        );
        op
    }

    #[test]
    fn enqueue_overflow_is_rejected() {
        let mut mgr = OperationManager::new(1, 10);
        mgr.enqueue(noop_operation(std::time::Duration::from_secs(1))).unwrap();
        let err = mgr.enqueue(noop_operation(std::time::Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, OperationError::OperationQueueOverflow));
    }

    #[test]
    fn schedule_waiting_respects_concurrency_bound() {
        let mut mgr = OperationManager::new(10, 1);
        mgr.enqueue(noop_operation(std::time::Duration::from_secs(1))).unwrap();
        mgr.enqueue(noop_operation(std::time::Duration::from_secs(1))).unwrap();
        let dispatched = mgr.schedule_waiting();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(mgr.active_count(), 1);
    }

    #[tokio::test]
    async fn closing_fails_everything_outstanding() {
        let mut mgr = OperationManager::new(10, 10);
        let (op, rx) = Operation::new(
            CommandTag::HeartbeatRequest,
            vec![],
            std::time::Duration::from_secs(1),
            Some(3),
            Box::new(|_pkg| Disposition::Success(vec![])),
        );
        mgr.enqueue(op).unwrap();
        mgr.schedule_waiting();
        mgr.on_closed();
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(OperationError::ConnectionClosed)));
    }
}
