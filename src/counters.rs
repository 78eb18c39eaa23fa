// SPDX-License-Identifier: Apache-2.0

//! Prometheus counters/gauges recognized by the telemetry surface (spec §6).

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Number of pages fetched from the upstream committed-transaction stream.
pub static LISTENER_PAGES_FETCHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_listener_pages_fetched",
        "Number of pages fetched from the upstream committed-transaction stream"
    )
    .unwrap()
});

/// Number of transactions processed to a terminal state (committed or dead-lettered).
pub static LISTENER_TRANSACTIONS_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_listener_transactions_processed",
        "Number of transactions processed to a terminal state"
    )
    .unwrap()
});

/// Number of transactions that exhausted their retry budget and were dead-lettered.
pub static LISTENER_TRANSACTIONS_DEAD_LETTERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_listener_transactions_dead_lettered",
        "Number of transactions dead-lettered after exhausting their retry budget"
    )
    .unwrap()
});

/// Number of vote weight calculations that returned PendingWeight.
pub static WEIGHT_PENDING_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_weight_pending_count",
        "Number of vote weight calculations that returned PendingWeight"
    )
    .unwrap()
});

/// Number of vote weight calculations that returned a determinate Weight(w).
pub static WEIGHT_COMPLETED_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_weight_completed_count",
        "Number of vote weight calculations that completed with a determinate weight"
    )
    .unwrap()
});

/// Number of vote weight calculations that failed permanently (distinct from PendingWeight).
pub static WEIGHT_FAILED_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_weight_failed_count",
        "Number of vote weight calculations that failed permanently"
    )
    .unwrap()
});

/// Current committed cursor state version.
pub static CURSOR_STATE_VERSION: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "gov_collector_cursor_state_version",
        "Current committed cursor state version"
    )
    .unwrap()
});

/// Number of replayed transactions rejected by the dedup buffer.
pub static DEDUP_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_dedup_hits",
        "Number of replayed transactions rejected by the dedup buffer"
    )
    .unwrap()
});

/// Per-error-kind counter for the per-transaction handler, labeled by kind.
pub static HANDLER_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gov_collector_handler_errors",
        "Per-transaction handler errors, labeled by error kind",
        &["kind"]
    )
    .unwrap()
});

/// Unknown event variants seen by the decoder, counted but ignored.
pub static DECODER_UNKNOWN_EVENT_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gov_collector_decoder_unknown_event_count",
        "Number of events with an unrecognized (blueprint, event name) seen by the decoder"
    )
    .unwrap()
});

/// Number of recompute triggers drained by the Trigger Consumer, labeled by outcome.
pub static TRIGGER_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gov_collector_trigger_outcomes",
        "Recompute trigger outcomes, labeled by outcome (resolved, pending, failed)",
        &["outcome"]
    )
    .unwrap()
});
