//! Prometheus metrics for books-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Documents posted, by outcome.
pub static POSTINGS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "books_postings_total",
        "Total number of documents posted",
        &["status"]
    )
    .expect("Failed to register postings_total")
});

/// Statement imports, by outcome.
pub static STATEMENT_IMPORTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "books_statement_imports_total",
        "Total number of statement imports",
        &["status"]
    )
    .expect("Failed to register statement_imports_total")
});

/// Reconciliation runs, by kind (provisional/final) and outcome.
pub static RECONCILIATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "books_reconciliations_total",
        "Total number of reconciliation runs",
        &["kind", "status"]
    )
    .expect("Failed to register reconciliations_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "books_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "books_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Count one failed operation under its error class.
pub fn record_error(err: &service_core::error::AppError) {
    use service_core::error::AppError;
    let label = match err {
        AppError::ValidationError(_) | AppError::BadRequest(_) => "validation_error",
        AppError::NotFound(_) => "not_found",
        AppError::Conflict(_) => "conflict",
        AppError::DatabaseError(_) => "db_error",
        _ => "internal_error",
    };
    ERRORS_TOTAL.with_label_values(&[label]).inc();
}

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&POSTINGS_TOTAL);
    Lazy::force(&STATEMENT_IMPORTS_TOTAL);
    Lazy::force(&RECONCILIATIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
