// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the collector. Mirrors the error kinds a careful operator needs to
//! distinguish: what's safe to retry, what's safe to dead-letter, and what must crash the
//! process because it indicates a bug or a manual rollback.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    /// Network timeout, rate limit, or 5xx from the gateway. Always retryable.
    #[error("transient gateway error: {0}")]
    TransientGateway(String),

    /// Entity-not-found, schema mismatch, or decode failure. Not retryable; the caller
    /// should dead-letter the owning transaction after the retry budget is exhausted.
    #[error("permanent gateway error: {0}")]
    PermanentGateway(String),

    /// The cursor store was asked to move backwards or stay put. Indicates a bug or a
    /// manual rollback; fatal.
    #[error("cursor regressed: attempted to advance to {attempted}, current is {current}")]
    CursorRegressed { current: i64, attempted: i64 },

    /// The configured dedup window is too small for the observed reordering. Degrades
    /// (a transaction may be reprocessed) but is not fatal.
    #[error("dedup buffer exhausted: window of {window} too small")]
    DedupBufferExhausted { window: usize },

    /// A Snapshot Engine invariant was violated: vote on an unknown poll, an option id
    /// not in the poll, an empty selection set, too many selections, or a tally that
    /// would go negative. Fatal; the offending transaction is preserved in dead_letters.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// The upstream stream returned items out of ascending stateVersion order within a
    /// single page. A contract violation by the gateway; the listener must not advance
    /// the cursor over the offending page.
    #[error("non-monotonic page from upstream: saw {got} after {prev}")]
    NonMonotonicPage { prev: i64, got: i64 },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::PoolError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CollectorError {
    /// Whether this is a bug-class error that should crash the process rather than be
    /// handled locally. `CursorRegressed` and `InvariantViolated` are fatal by contract;
    /// `NonMonotonicPage` is a gateway contract violation the listener has no safe way
    /// to paper over, so it is treated the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollectorError::CursorRegressed { .. }
                | CollectorError::InvariantViolated(_)
                | CollectorError::NonMonotonicPage { .. }
        )
    }

    /// Whether a caller should retry this operation rather than dead-letter it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollectorError::TransientGateway(_) | CollectorError::Pool(_)
        )
    }

    /// Short label used by the `dead_letters.error_kind` column and the
    /// `gov_collector_handler_errors` counter's `kind` label.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            CollectorError::TransientGateway(_) => "transient_gateway",
            CollectorError::PermanentGateway(_) => "permanent_gateway",
            CollectorError::CursorRegressed { .. } => "cursor_regressed",
            CollectorError::DedupBufferExhausted { .. } => "dedup_buffer_exhausted",
            CollectorError::InvariantViolated(_) => "invariant_violated",
            CollectorError::NonMonotonicPage { .. } => "non_monotonic_page",
            CollectorError::Database(_) => "database",
            CollectorError::Pool(_) => "pool",
            CollectorError::Other(_) => "other",
        }
    }
}

pub type CollectorResult<T> = Result<T, CollectorError>;
