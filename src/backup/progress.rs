//! Run statistics and per-file progress lines
//!
//! Every worker shares one [`RunStats`]. Counters live behind a single mutex
//! so that `files_done` and `bytes_done` always move together: a snapshot
//! never shows a file counted without its bytes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;
use std::time::{Duration, Instant};

use super::task::UploadOutcome;
use crate::metrics;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;

/// Format a byte count with binary units
///
/// Kilobytes and bytes are shown without decimals, larger units with two:
/// `1536 -> "2K"`, `1073741824 -> "1.00G"`.
pub fn readable_bytes(bytes: u64) -> String {
    readable(bytes as f64)
}

fn readable(bytes: f64) -> String {
    if bytes >= TIB {
        format!("{:.2}T", bytes / TIB)
    } else if bytes >= GIB {
        format!("{:.2}G", bytes / GIB)
    } else if bytes >= MIB {
        format!("{:.2}M", bytes / MIB)
    } else if bytes >= KIB {
        format!("{:.0}K", bytes / KIB)
    } else {
        format!("{:.0}b", bytes)
    }
}

/// Cumulative counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Files that finished, uploaded or skipped
    pub files_done: u64,
    /// Local size of every finished file
    pub bytes_done: u64,
    /// Bytes actually sent, after compression
    pub bytes_transferred: u64,
    pub files_uploaded: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub counters: Counters,
    pub total_files: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Average local bytes per second since the run started
    pub fn throughput(&self) -> f64 {
        self.counters.bytes_done as f64 / self.elapsed.as_secs_f64().max(1e-3)
    }
}

/// Shared statistics for a backup run
#[derive(Debug)]
pub struct RunStats {
    total_files: u64,
    started_at: DateTime<Utc>,
    started: Instant,
    counters: Mutex<Counters>,
}

impl RunStats {
    pub fn new(total_files: u64) -> Self {
        Self {
            total_files,
            started_at: Utc::now(),
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    /// Wall-clock start of the run
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Count a finished file
    pub fn record_completed(&self, local_bytes: u64, transferred: u64, skipped: bool) -> ProgressSnapshot {
        let counters = {
            let mut c = self.counters.lock();
            c.files_done += 1;
            c.bytes_done += local_bytes;
            c.bytes_transferred += transferred;
            if skipped {
                c.files_skipped += 1;
            } else {
                c.files_uploaded += 1;
            }
            *c
        };
        self.snapshot_of(counters)
    }

    /// Count a file whose processing failed
    pub fn record_failed(&self) -> ProgressSnapshot {
        let counters = {
            let mut c = self.counters.lock();
            c.files_failed += 1;
            *c
        };
        self.snapshot_of(counters)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = *self.counters.lock();
        self.snapshot_of(counters)
    }

    fn snapshot_of(&self, counters: Counters) -> ProgressSnapshot {
        ProgressSnapshot {
            counters,
            total_files: self.total_files,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Marker for uploaded files
pub const UPLOAD_MARKER: char = '+';
/// Marker for skipped files
pub const SKIP_MARKER: char = '=';

/// `+ 12/40 3.10M (2K) 1.05M/s /data/notes.txt`
pub fn format_progress_line(skipped: bool, snapshot: &ProgressSnapshot, size: u64, path: &Path) -> String {
    format!(
        "{} {}/{} {} ({}) {}/s {}",
        if skipped { SKIP_MARKER } else { UPLOAD_MARKER },
        snapshot.counters.files_done,
        snapshot.total_files,
        readable_bytes(snapshot.counters.bytes_done),
        readable_bytes(size),
        readable(snapshot.throughput()),
        path.display()
    )
}

/// Records each finished file and logs its progress line
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    stats: std::sync::Arc<RunStats>,
}

impl ProgressReporter {
    pub fn new(stats: std::sync::Arc<RunStats>) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn report(&self, path: &Path, outcome: &UploadOutcome) -> ProgressSnapshot {
        let snapshot =
            self.stats
                .record_completed(outcome.local_bytes, outcome.transferred_bytes, outcome.skipped);

        metrics::record_file_completed(outcome.skipped, outcome.local_bytes, outcome.transferred_bytes);

        tracing::info!(
            outcome = if outcome.skipped { "skip" } else { "upload" },
            done = snapshot.counters.files_done,
            total = snapshot.total_files,
            bytes_done = snapshot.counters.bytes_done,
            size = outcome.local_bytes,
            path = %path.display(),
            "{}",
            format_progress_line(outcome.skipped, &snapshot, outcome.local_bytes, path)
        );

        snapshot
    }

    pub fn report_failure(&self, path: &Path, error: &dyn std::fmt::Display) -> ProgressSnapshot {
        let snapshot = self.stats.record_failed();
        metrics::record_file_failed();

        tracing::error!(
            failed = snapshot.counters.files_failed,
            total = snapshot.total_files,
            path = %path.display(),
            error = %error,
            "! {} failed: {}",
            path.display(),
            error
        );

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_readable_bytes() {
        assert_eq!(readable_bytes(0), "0b");
        assert_eq!(readable_bytes(1023), "1023b");
        assert_eq!(readable_bytes(1024), "1K");
        assert_eq!(readable_bytes(1536), "2K");
        assert_eq!(readable_bytes(1048576), "1.00M");
        assert_eq!(readable_bytes(1572864), "1.50M");
        assert_eq!(readable_bytes(1073741824), "1.00G");
        assert_eq!(readable_bytes(1099511627776), "1.00T");
        assert_eq!(readable_bytes(5 * 1099511627776), "5.00T");
    }

    #[test]
    fn test_record_completed_counts_once() {
        let stats = RunStats::new(3);
        stats.record_completed(100, 40, false);
        stats.record_completed(50, 0, true);
        let snapshot = stats.record_failed();

        assert_eq!(snapshot.counters.files_done, 2);
        assert_eq!(snapshot.counters.bytes_done, 150);
        assert_eq!(snapshot.counters.bytes_transferred, 40);
        assert_eq!(snapshot.counters.files_uploaded, 1);
        assert_eq!(snapshot.counters.files_skipped, 1);
        assert_eq!(snapshot.counters.files_failed, 1);
        assert_eq!(snapshot.total_files, 3);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(RunStats::new(800));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_completed(10, 5, false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let counters = stats.snapshot().counters;
        assert_eq!(counters.files_done, 800);
        assert_eq!(counters.bytes_done, 8000);
        assert_eq!(counters.bytes_transferred, 4000);
    }

    #[test]
    fn test_progress_line_format() {
        let snapshot = ProgressSnapshot {
            counters: Counters {
                files_done: 2,
                bytes_done: 3 * 1024 * 1024,
                ..Default::default()
            },
            total_files: 5,
            elapsed: Duration::from_secs(2),
        };

        let line = format_progress_line(false, &snapshot, 1536, Path::new("/data/a.txt"));
        assert_eq!(line, "+ 2/5 3.00M (2K) 1.50M/s /data/a.txt");

        let line = format_progress_line(true, &snapshot, 10, Path::new("/data/b.txt"));
        assert!(line.starts_with("= 2/5 "));
        assert!(line.contains("(10b)"));
    }

    #[test]
    fn test_throughput_with_zero_elapsed() {
        let snapshot = ProgressSnapshot {
            counters: Counters {
                bytes_done: 10,
                ..Default::default()
            },
            total_files: 1,
            elapsed: Duration::ZERO,
        };
        assert!(snapshot.throughput().is_finite());
    }
}
