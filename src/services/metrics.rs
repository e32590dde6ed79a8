//! Prometheus metrics for guide updates
//!
//! Registered in the default registry, exported by `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static! {
    /// Finished runs by kind (`full`, `guide`) and outcome
    pub static ref RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "guide_sync_runs_total",
        "Playlist update runs by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap();

    /// Wall time of runs that acquired the lock
    pub static ref RUN_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "guide_sync_run_duration_seconds",
        "Duration of playlist update runs",
        &["kind"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap();

    /// Attempts rejected because the playlist was already running
    pub static ref LOCK_CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        "guide_sync_lock_conflicts_total",
        "Update attempts rejected by a held playlist lock"
    )
    .unwrap();

    /// Stale locks taken over from a crashed or hung holder
    pub static ref LOCK_RECLAIMS_TOTAL: IntCounter = register_int_counter!(
        "guide_sync_lock_reclaims_total",
        "Stale playlist locks reclaimed"
    )
    .unwrap();
}
