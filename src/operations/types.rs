//! Operation value type (ยง3): one in-flight request and its lifecycle state.

use crate::{
    error::OperationError,
    package::{CommandTag, Credentials, Package},
};
use futures_channel::oneshot;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// What the operation's response-inspection function decided to do with a
/// reply, per ยง4.2's dispatch rule.
pub enum Disposition {
    /// The operation is complete; deliver `payload` to the caller.
    Success(Vec<u8>),
    /// More frames are expected on this correlation id before completion.
    Continue,
    /// Transient failure; retry if under the retry ceiling.
    Retry(String),
    /// The server redirected us; re-enqueue without consuming a retry, and
    /// ask the connection driver to reconnect to the new node.
    Reconnect { host: String, port: u16 },
    /// Terminal failure.
    Fail(OperationError),
}

/// A function that inspects a raw response `Package` for one operation and
/// decides what should happen next. Boxed because each operation kind
/// (append, read, delete, ...) interprets its payload differently.
pub type ResponseInspector = Box<dyn FnMut(&Package) -> Disposition + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    InProgress,
    Retrying,
    Completed,
    Faulted,
}

/// One in-flight request, per ยง3. Exclusively owns its completion sink: once
/// the operation reaches `Completed` or `Faulted` the sink has been consumed
/// and the operation is discarded by the manager.
pub struct Operation {
    pub correlation_id: Uuid,
    pub command: CommandTag,
    pub payload: Vec<u8>,
    pub credentials: Option<Credentials>,
    pub created_at: Instant,
    pub last_attempt: Option<Instant>,
    pub retry_count: u32,
    pub max_retries: Option<u32>,
    pub timeout: Duration,
    pub state: OperationState,
    pub(crate) inspector: ResponseInspector,
    completion: Option<oneshot::Sender<Result<Vec<u8>, OperationError>>>,
}

impl Operation {
    pub fn new(
        command: CommandTag,
        payload: Vec<u8>,
        timeout: Duration,
        max_retries: Option<u32>,
        inspector: ResponseInspector,
    ) -> (Self, oneshot::Receiver<Result<Vec<u8>, OperationError>>) {
        let (tx, rx) = oneshot::channel();
        let op = Self {
            correlation_id: Uuid::new_v4(),
            command,
            payload,
            credentials: None,
            created_at: Instant::now(),
            last_attempt: None,
            retry_count: 0,
            max_retries,
            timeout,
            state: OperationState::Pending,
            inspector,
            completion: Some(tx),
        };
        (op, rx)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn to_package(&self) -> Package {
        let mut pkg = Package::new(self.command, self.correlation_id, self.payload.clone());
        if let Some(creds) = &self.credentials {
            pkg = pkg.with_credentials(creds.clone());
        }
        pkg
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, OperationState::Completed | OperationState::Faulted)
    }

    /// Consumes the completion sink. Panics if called twice; the manager
    /// guarantees this by transitioning to a terminal state before calling.
    pub fn complete(&mut self, result: Result<Vec<u8>, OperationError>) {
        debug_assert!(!self.is_terminal(), "operation completed twice");
        self.state = match &result {
            Ok(_) => OperationState::Completed,
            Err(_) => OperationState::Faulted,
        };
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(result);
        }
    }
}
