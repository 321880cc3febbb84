//! The coordinator's logging sink: a two-method contract (spec.md §6) the
//! caller supplies, plus a minimal default that writes to stderr.

use chrono::Utc;

/// External collaborator: the coordinator emits `info` on start, on
/// delete, and on stop, and `error` when a job's function fails.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Writes timestamped lines to stderr. The crate's own default; callers are
/// free to bridge this trait to `log`, `tracing`, or anything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn info(&self, message: &str) {
        eprintln!("{} INFO {message}", Utc::now().to_rfc3339());
    }

    fn error(&self, message: &str) {
        eprintln!("{} ERROR {message}", Utc::now().to_rfc3339());
    }
}

/// Discards everything. Used by tests and benches that don't want stderr
/// noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}
