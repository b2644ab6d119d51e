//! Error types. One enum per collaborator (mirroring
//! `querymt::session::store::SessionStoreError`), plus a top-level
//! [`CoreError`] that the orchestrator returns, with `#[from]` conversions
//! from each collaborator error.

use thiserror::Error;

/// Errors from a [`crate::llm::LlmClient`] call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connect error: {0}")]
    Connect(String),
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("upstream server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("response parse error: {0}")]
    ResponseFormat(String),
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },
}

impl LlmError {
    /// Whether this error class is worth retrying per spec.md §4.5
    /// (connection errors, 502, 429).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Connect(_) | LlmError::RateLimited { .. } | LlmError::Server { status: 502, .. }
        )
    }
}

/// Errors from a [`crate::captions::CaptionSource`] fetch.
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("no transcript available for video")]
    NoTranscript,
    #[error("transcripts are disabled for video")]
    TranscriptsDisabled,
    #[error("transient caption-fetch error: {0}")]
    Transient(String),
}

impl CaptionError {
    /// Both `NoTranscript` and `TranscriptsDisabled` are terminal negative
    /// outcomes that populate the no-captions cache (spec.md §4.4).
    pub fn is_terminal_negative(&self) -> bool {
        matches!(self, CaptionError::NoTranscript | CaptionError::TranscriptsDisabled)
    }
}

/// Errors from a [`crate::store::ChapterStore`].
#[derive(Debug, Error)]
pub enum ChapterStoreError {
    #[error("database error: {0}")]
    Db(String),
    #[error("serialization error: {0}")]
    Codec(String),
}

/// Errors from a [`crate::registry::JobRegistry`]. Per spec.md §4.1, these
/// are advisory: the orchestrator must treat them as "unknown" and fall
/// through to `ChapterStore`, never propagate them as request failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry backend error: {0}")]
    Backend(String),
}

/// Top-level error surfaced by the [`crate::orchestrator::Orchestrator`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request input (bad hints, bad headers). Maps to HTTP 400.
    #[error("validation error: {0}")]
    Validation(String),

    /// Captions genuinely absent. Maps to HTTP 404 (caller translates to
    /// a `NOTHING` response rather than surfacing an error to the end user).
    #[error(transparent)]
    Captions(#[from] CaptionError),

    /// The chapterizer cascade produced zero chapters. Maps to HTTP 500.
    #[error("summarize failed: chapterizer produced zero chapters")]
    FatalSummarize,

    #[error(transparent)]
    Store(#[from] ChapterStoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
