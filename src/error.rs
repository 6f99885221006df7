//! Error taxonomy for the client.
//!
//! Every variant mirrors a closed set named by the protocol: operational
//! failures raised by the operation manager, protocol-level faults echoed by
//! the server, subscription drop reasons, and configuration errors rejected
//! at build time. Lower-level causes are always attached via `#[source]` so
//! `tracing`'s `err` instrumentation captures the full chain.

use std::fmt;
use uuid::Uuid;

/// Errors that can terminate or retry an in-flight [`crate::operations::Operation`].
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The server rejected the expected-version check.
    #[error("wrong expected version for stream {stream:?}")]
    WrongExpectedVersion { stream: String },
    /// The target stream has been (soft- or hard-) deleted.
    #[error("stream {0:?} has been deleted")]
    StreamDeleted(String),
    /// A transaction operation was issued against an unknown or closed transaction id.
    #[error("invalid transaction {0}")]
    InvalidTransaction(u64),
    /// The authenticated identity lacks the ACL role required for this operation.
    #[error("access denied")]
    AccessDenied,
    /// No credentials were supplied, or the server rejected them outright.
    #[error("not authenticated")]
    NotAuthenticated,
    /// The server reported an internal error while servicing the request.
    #[error("server error: {0}")]
    ServerError(String),
    /// The server received a command it did not expect in the current context.
    #[error("command not expected")]
    CommandNotExpected,
    /// The persistent subscription group referenced no longer exists.
    #[error("persistent subscription deleted")]
    PersistentSubscriptionDeleted,
    /// The persistent subscription group has reached its subscriber limit.
    #[error("maximum subscribers reached")]
    MaximumSubscribersReached,
    /// The request payload failed server-side validation.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No response arrived within `operationTimeout` and `failOnNoServerResponse` is set.
    #[error("operation timed out")]
    OperationTimedOut,
    /// The operation exhausted `maxOperationRetries`.
    #[error("retry limit reached")]
    RetryLimitReached,
    /// `enqueue` was called while the waiting queue was already at `maxOperationQueueSize`.
    #[error("operation queue overflow")]
    OperationQueueOverflow,
    /// The connection was closed (explicitly, or fatally) while the operation was outstanding.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Reasons a subscription's drop callback may fire, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The caller explicitly unsubscribed.
    Unsubscribed,
    /// The authenticated identity lacks the required ACL role.
    AccessDenied,
    /// The stream or persistent-subscription group does not exist.
    NotFound,
    /// The persistent subscription group was deleted server-side.
    PersistentSubscriptionDeleted,
    /// The persistent subscription group's subscriber limit was reached.
    SubscriberMaxCountReached,
    /// The connection was closed while the subscription was active.
    ConnectionClosed,
    /// An error occurred during a catch-up subscription's historical read phase.
    CatchUpError,
    /// The catch-up subscription's live push queue exceeded `maxPushQueueSize`.
    ProcessingQueueOverflow,
    /// The user's event callback raised an exception.
    EventHandlerException,
    /// The server reported an internal error for this subscription.
    ServerError,
    /// The subscription was stopped by the user (catch-up subscription `stop()`).
    UserInitiated,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors surfaced while building a [`crate::config::ClientSettings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Neither a static endpoint nor a cluster seed list was supplied.
    #[error("no node settings: configure either a static endpoint or cluster seeds")]
    MissingNodeSettings,
    /// Both a static endpoint and cluster seeds were supplied.
    #[error("conflicting settings: a static endpoint and cluster seeds cannot both be set")]
    ConflictingEndpoints,
    /// A numeric parameter fell outside its documented valid range.
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
    /// A catch-up subscription's `readBatchSize` was at or above the server's read-slice ceiling.
    #[error("readBatchSize {requested} must be less than the max read slice size {ceiling}")]
    ReadBatchTooLarge { requested: u32, ceiling: u32 },
    /// Loading environment/TOML configuration sources failed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

/// Errors raised while discovering a node endpoint to connect to.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// No seed node in the cluster configuration could be reached.
    #[error("no seed node reachable")]
    NoSeedReachable,
    /// None of the reachable nodes satisfied `requireMaster`.
    #[error("no node satisfying requireMaster was found")]
    NoSuitableNode,
    /// The configured endpoint URL could not be parsed.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors raised by the length-prefixed frame codec.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared frame length exceeds the 64 MiB ceiling.
    #[error("frame length {0} exceeds the maximum of {max}", max = crate::package::MAX_FRAME_LEN)]
    TooLarge(u32),
    /// The frame was truncated (shorter than its own header requires).
    #[error("truncated frame")]
    Truncated,
    /// The payload failed to parse into a well-formed [`crate::package::Package`].
    #[error("malformed package: {0}")]
    Malformed(String),
    /// The underlying byte stream returned an I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error type returned by the connection driver and facade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("subscription {id} dropped: {reason}")]
    SubscriptionDropped { id: Uuid, reason: DropReason },
    #[error("tls error: {0}")]
    Tls(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
