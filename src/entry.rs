//! [`Entry`] (component E): binds a user function to a schedule, tracks its
//! next firing time, and keeps a bounded history of the errors it raised.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::logger::{Logger, NopLogger};
use crate::schedule::{Schedule, NEVER};

/// Error history is capped to this many entries; the oldest is dropped
/// first (spec.md §7: "recommended: 16 entries").
pub const ERROR_HISTORY_CAP: usize = 16;

/// A function invoked on each firing. `Err` is recorded, not fatal.
pub type JobFn = Box<dyn Fn() -> std::result::Result<(), String> + Send + Sync>;

/// One recorded failure of a job's function.
#[derive(Debug, Clone)]
pub struct JobError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// A registered job: its id, schedule, function, cached next-fire time, and
/// a bounded error history. Mutated only by the scheduler loop, except
/// `next`, which the sort step also reads under `next`'s mutex.
pub struct Entry {
    pub id: String,
    pub schedule: Box<dyn Schedule>,
    pub func: JobFn,
    next: Mutex<DateTime<Utc>>,
    errors: Mutex<Vec<JobError>>,
    running: AtomicBool,
    logger: Arc<dyn Logger>,
}

impl Entry {
    pub fn new(id: String, schedule: Box<dyn Schedule>, func: JobFn) -> Self {
        Self::with_logger(id, schedule, func, Arc::new(NopLogger))
    }

    pub fn with_logger(
        id: String,
        schedule: Box<dyn Schedule>,
        func: JobFn,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            id,
            schedule,
            func,
            next: Mutex::new(NEVER),
            errors: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            logger,
        }
    }

    /// Attempt to claim this entry for a firing. Returns `false` if a
    /// previous firing of the same job is still in flight (spec.md §4.F
    /// P6: at most one concurrent invocation per job).
    pub fn try_acquire(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the claim taken by [`Entry::try_acquire`].
    pub fn release(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Recompute and cache `next` from `now`.
    pub fn set_next(&self, now: DateTime<Utc>) {
        let next = self.schedule.next(now);
        *self.next.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// The cached next-fire time.
    pub fn next(&self) -> DateTime<Utc> {
        *self.next.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an error to the bounded history, dropping the oldest if full.
    fn record_error(&self, message: String, at: DateTime<Utc>) {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        if errors.len() >= ERROR_HISTORY_CAP {
            errors.remove(0);
        }
        errors.push(JobError { message, at });
    }

    /// Snapshot of the error history, oldest first.
    pub fn error_history(&self) -> Vec<JobError> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Invoke the function and report whether the entry should keep
    /// running (spec.md §4.E):
    /// - function errored → recorded, keep running.
    /// - function ok, schedule has no terminal instant → keep running.
    /// - function ok, terminal instant is before now → stop.
    /// - otherwise → keep running.
    pub fn run(&self) -> bool {
        let now = Utc::now();
        match (self.func)() {
            Err(message) => {
                self.logger.error(&message);
                self.record_error(message, now);
                true
            }
            Ok(()) => {
                let last = self.schedule.last();
                !(last != NEVER && last < now)
            }
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("next", &self.next())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::schedule::FixedSchedule;
    use chrono::Duration;

    #[test]
    fn run_keeps_going_on_error() {
        let entry = Entry::new(
            "1".into(),
            Box::new(FixedSchedule::new(Utc::now())),
            Box::new(|| Err("boom".to_string())),
        );
        assert!(entry.run());
        let history = entry.error_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history.first().map(|e| e.message.as_str()), Some("boom"));
    }

    #[test]
    fn run_stops_after_terminal_instant_passed() {
        let past = Utc::now() - Duration::hours(1);
        let entry = Entry::new(
            "1".into(),
            Box::new(FixedSchedule::new(past)),
            Box::new(|| Ok(())),
        );
        assert!(!entry.run());
    }

    #[test]
    fn run_continues_when_schedule_never_terminates() {
        let future = Utc::now() + Duration::hours(1);
        let entry = Entry::new(
            "1".into(),
            Box::new(FixedSchedule::new(future)),
            Box::new(|| Ok(())),
        );
        assert!(entry.run());
    }

    #[test]
    fn error_history_is_bounded() {
        let entry = Entry::new(
            "1".into(),
            Box::new(FixedSchedule::new(Utc::now())),
            Box::new(|| Err("x".to_string())),
        );
        for _ in 0..(ERROR_HISTORY_CAP + 5) {
            entry.run();
        }
        assert_eq!(entry.error_history().len(), ERROR_HISTORY_CAP);
    }

    #[test]
    fn try_acquire_is_exclusive_until_released() {
        let entry = Entry::new(
            "1".into(),
            Box::new(FixedSchedule::new(Utc::now())),
            Box::new(|| Ok(())),
        );
        assert!(entry.try_acquire());
        assert!(!entry.try_acquire());
        entry.release();
        assert!(entry.try_acquire());
    }
}
