//! Metrics module
//!
//! Prometheus counters for a backup run. There is no scrape endpoint; a run
//! is short-lived, so the registry is written once at the end in the text
//! exposition format (see [`write_textfile`]), which node_exporter's textfile
//! collector picks up.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::io;
use std::path::Path;

lazy_static! {
    // File metrics
    pub static ref FILES_TOTAL: CounterVec = register_counter_vec!(
        "mizuchi_backup_files_total",
        "Files processed, by outcome",
        &["outcome"]  // "uploaded", "skipped" or "failed"
    ).unwrap();

    pub static ref BYTES_SCANNED_TOTAL: Counter = register_counter!(
        "mizuchi_backup_bytes_scanned_total",
        "Local bytes of every finished file"
    ).unwrap();

    pub static ref BYTES_TRANSFERRED_TOTAL: Counter = register_counter!(
        "mizuchi_backup_bytes_transferred_total",
        "Bytes sent to the object store after compression"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "mizuchi_backup_upload_duration_seconds",
        "PutObject duration in seconds, including retries",
        &["strategy"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Retry metrics
    pub static ref RETRIES_TOTAL: CounterVec = register_counter_vec!(
        "mizuchi_backup_retries_total",
        "Retried object store calls",
        &["operation"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "mizuchi_backup_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a finished file
pub fn record_file_completed(skipped: bool, local_bytes: u64, transferred_bytes: u64) {
    let outcome = if skipped { "skipped" } else { "uploaded" };
    FILES_TOTAL.with_label_values(&[outcome]).inc();
    BYTES_SCANNED_TOTAL.inc_by(local_bytes as f64);
    BYTES_TRANSFERRED_TOTAL.inc_by(transferred_bytes as f64);
}

/// Record a file that could not be backed up
pub fn record_file_failed() {
    FILES_TOTAL.with_label_values(&["failed"]).inc();
}

/// Record upload duration for a staging strategy (`raw`, `memory`, `temp_file`)
pub fn record_upload_duration(strategy: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[strategy])
        .observe(duration_secs);
}

/// Record one retry of `operation`
pub fn record_retry(operation: &str) {
    RETRIES_TOTAL.with_label_values(&[operation]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Encode the default registry in the text exposition format
pub fn gather_text() -> io::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write all metrics to `path`
///
/// The file is written next to its destination and renamed into place, so a
/// collector never reads a half-written file.
pub fn write_textfile(path: &Path) -> io::Result<()> {
    let text = gather_text()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)
}
