use std::io;

use thiserror::Error;

pub type TrackResult<T> = Result<T, TrackError>;

#[derive(Debug, Error)]
pub enum TrackError {
    /// The root cancellation token fired while a controller was being tracked.
    #[error("track interrupted")]
    Interrupted,

    /// The pod tracker's context expired or was cancelled.
    #[error("track timed out")]
    Timeout,

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A watch event decoded into something other than the tracked kind.
    #[error("unexpected object kind: {0}")]
    UnexpectedKind(String),

    #[error("watch error: {0}")]
    Watch(String),

    #[error("{0}")]
    Other(String),
}

/// Returned by feed callbacks: keep the tracker running or shut it down
/// cleanly. `Stop` makes the surrounding track call return `Ok(())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub type FeedResult = Result<Flow, TrackError>;
