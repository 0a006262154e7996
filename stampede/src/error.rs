use thiserror::Error;

/// Errors returned synchronously by [`crate::runner::ProbeRunner::start_run`].
///
/// Both are raised before any worker is spawned, so an error never leaves a
/// partial run behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("runner has already been started")]
    AlreadyStarted,
}

/// Failure of a single probe below the HTTP status level.
///
/// Never propagated out of a worker: it is turned into a
/// [`crate::message::ProbeOutcome::TransientFailure`] and raises the stop signal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}
