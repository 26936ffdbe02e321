//! The closed error taxonomy described in the design notes on error handling.
//!
//! Component-internal plumbing (HTTP parsing, config validation) still uses
//! `anyhow::Result` the way the rest of this crate does; `CoreError` exists
//! for the handful of seams where callers must distinguish *kinds* of
//! failure rather than just log-and-continue: the poller deciding whether to
//! treat a tick as empty-but-retry-next-time, and the repository surfacing a
//! write conflict distinctly from a plain connection error.

use thiserror::Error;

/// A distinguishable error kind, as opposed to a type hierarchy. No variant
/// here is fatal to the process; the caller decides the retry/backoff/log
/// policy per variant.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Connectivity, timeout, 5xx, quota throttling. The failing call yields
    /// empty data for the current tick; the next tick retries naturally.
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    /// Malformed response, or a 4xx other than quota throttling.
    #[error("permanent upstream failure: {0}")]
    PermanentUpstream(String),

    /// Connection drop, deadlock, or similar recoverable repository failure.
    #[error("transient repository failure: {0}")]
    RepositoryTransient(String),

    /// A uniqueness violation on `apiFixtureID`. Must never occur under the
    /// upsert contract; if it does, the write is dropped and this is logged
    /// loudly by the caller.
    #[error("repository integrity violation: {0}")]
    RepositoryIntegrity(String),

    /// A subscriber's outbound buffer was full; the update was dropped for
    /// that subscriber only.
    #[error("subscriber backpressure: {0}")]
    SubscriberBackpressure(String),

    /// The client transport was cancelled; not a failure, just unwinds.
    #[error("client cancelled")]
    ClientCancelled,

    /// A write was rejected because it would have regressed fixture state
    /// (e.g. a terminal status reverting to a live one, or a non-mutable
    /// field changing).
    #[error("write conflict on fixture {fixture_id}: {reason}")]
    WriteConflict { fixture_id: i64, reason: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
