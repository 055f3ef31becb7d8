//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Counter, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Feed Metrics
    pub static ref FEEDS_SERVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_feeds_served_total", "Total number of feeds served by path"),
        &["path"]
    ).expect("metric can be created");
    pub static ref JOKES_SAVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_jokes_saved_total", "Total number of jokes written by the save path"),
        &["outcome"]
    ).expect("metric can be created");

    // Provider Metrics
    pub static ref GENERATION_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_generation_requests_total", "Total number of joke generation requests"),
        &["status"]
    ).expect("metric can be created");
    pub static ref GENERATION_DURATION_SECONDS: prometheus::Histogram = prometheus::Histogram::with_opts(
        HistogramOpts::new(
            "jokebox_generation_duration_seconds",
            "Joke generation duration in seconds"
        ).buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    ).expect("metric can be created");
    pub static ref SYNTHESIS_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_synthesis_requests_total", "Total number of speech synthesis requests"),
        &["status"]
    ).expect("metric can be created");

    // Database Metrics
    pub static ref DB_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_db_queries_total", "Total number of database queries"),
        &["operation", "table"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");

    // Background Task Metrics
    pub static ref BACKGROUND_TASKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_background_tasks_total", "Total number of finished background tasks"),
        &["task", "status"]
    ).expect("metric can be created");
    pub static ref BACKGROUND_TASKS_IN_FLIGHT: IntGauge = IntGauge::new(
        "jokebox_background_tasks_in_flight",
        "Current number of running background tasks"
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref AUDIO_BYTES_UPLOADED: Counter = Counter::new(
        "jokebox_audio_bytes_uploaded_total",
        "Total bytes of audio uploaded"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jokebox_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(FEEDS_SERVED_TOTAL.clone()))
            .expect("FEEDS_SERVED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(JOKES_SAVED_TOTAL.clone()))
            .expect("JOKES_SAVED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(GENERATION_REQUESTS_TOTAL.clone()))
            .expect("GENERATION_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(GENERATION_DURATION_SECONDS.clone()))
            .expect("GENERATION_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(SYNTHESIS_REQUESTS_TOTAL.clone()))
            .expect("SYNTHESIS_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(DB_QUERIES_TOTAL.clone()))
            .expect("DB_QUERIES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("CACHE_HITS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("CACHE_MISSES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(BACKGROUND_TASKS_TOTAL.clone()))
            .expect("BACKGROUND_TASKS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(BACKGROUND_TASKS_IN_FLIGHT.clone()))
            .expect("BACKGROUND_TASKS_IN_FLIGHT can be registered");
        REGISTRY
            .register(Box::new(AUDIO_BYTES_UPLOADED.clone()))
            .expect("AUDIO_BYTES_UPLOADED can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Record one database statement
pub(crate) fn observe_db_query(operation: &str, table: &str) {
    DB_QUERIES_TOTAL
        .with_label_values(&[operation, table])
        .inc();
}
