//! The coordinator (component F): a single loop that owns the active job
//! set, wakes at the earliest `next` among them, dispatches due jobs onto
//! their own threads, and drains in-flight work before a stop completes.
//!
//! Grounded on `original_source/run.go`'s `Run()`: sort by `next`, wait on
//! a timer set to the soonest one (or a fallback window if the set is
//! empty or has nothing due soon), and multiplex `add`/`del`/`stop` onto
//! the same wait via a channel select. Rust has no `select`, so `add`,
//! `delete`, and `stop` are unified onto one `mpsc` channel and
//! `recv_timeout` plays the role of the timer arm.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::entry::{Entry, JobFn};
use crate::error::{CronError, Result};
use crate::idgen::{IdGen, SnowflakeIdGen};
use crate::logger::{Logger, StderrLogger};
use crate::schedule::{FixedSchedule, Schedule};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

/// Fallback wait when no entry has a `next` strictly after now (spec.md
/// §4.F: "10 minutes" when the active set is empty or exhausted).
pub const DEFAULT_IDLE_TIMER: StdDuration = StdDuration::from_secs(600);

/// Tunables for a [`Scheduler`]. `Default` matches spec.md's named
/// constants.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub idle_timer: StdDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_timer: DEFAULT_IDLE_TIMER,
        }
    }
}

enum Command {
    Add(Arc<Entry>),
    Delete(String),
    Stop,
}

/// The scheduling event loop (spec.md §4.F). Construct one, call
/// [`Scheduler::run`] on whatever thread should block for the process
/// lifetime (typically a spawned one), and drive it from other threads
/// via [`Scheduler::add_with_cron`], [`Scheduler::add_with_time`],
/// [`Scheduler::delete`], and [`Scheduler::stop`].
///
/// A `Scheduler` carries one `run`/`stop` lifecycle: once `run` returns
/// after a `stop`, the receiver half of its command channel is spent and
/// a second `run` call is a no-op. Start a fresh `Scheduler` to run again.
pub struct Scheduler {
    tx: mpsc::Sender<Command>,
    rx: Mutex<Option<mpsc::Receiver<Command>>>,
    state: AtomicU8,
    inflight: Arc<(Mutex<usize>, Condvar)>,
    id_gen: Arc<dyn IdGen>,
    logger: Arc<dyn Logger>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_parts(
            SchedulerConfig::default(),
            Arc::new(SnowflakeIdGen::new()),
            Arc::new(StderrLogger),
        )
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with_parts(config, Arc::new(SnowflakeIdGen::new()), Arc::new(StderrLogger))
    }

    pub fn with_parts(
        config: SchedulerConfig,
        id_gen: Arc<dyn IdGen>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            state: AtomicU8::new(IDLE),
            inflight: Arc::new((Mutex::new(0), Condvar::new())),
            id_gen,
            logger,
            config,
        }
    }

    /// Low-level registration: any schedule, any job.
    ///
    /// # Errors
    /// Returns [`CronError::NotRunning`] unless the coordinator loop is
    /// currently running (`add` before `run` reports the caller's mistake
    /// rather than blocking forever).
    pub fn add(&self, schedule: Box<dyn Schedule>, func: JobFn) -> Result<String> {
        if self.state.load(Ordering::Acquire) != RUNNING {
            return Err(CronError::NotRunning);
        }
        let id = self.id_gen.next_id();
        let entry = Arc::new(Entry::with_logger(
            id.clone(),
            schedule,
            func,
            self.logger.clone(),
        ));
        self.tx
            .send(Command::Add(entry))
            .map_err(|_| CronError::NotRunning)?;
        Ok(id)
    }

    /// Register a one-shot job that fires once at `at`.
    ///
    /// # Errors
    /// Returns [`CronError::NotRunning`] unless the coordinator is running.
    pub fn add_with_time(&self, at: DateTime<Utc>, func: JobFn) -> Result<String> {
        self.add(Box::new(FixedSchedule::new(at)), func)
    }

    /// Parse `spec` as a six-field crontab expression and register a
    /// recurring job on it.
    ///
    /// # Errors
    /// Returns [`CronError::InvalidParameter`] if `spec` doesn't parse, or
    /// [`CronError::NotRunning`] unless the coordinator is running.
    pub fn add_with_cron(&self, spec: &str, func: JobFn) -> Result<String> {
        let schedule = crate::schedule::parse(spec)?;
        self.add(Box::new(schedule), func)
    }

    /// Remove a job by id. Idempotent: deleting an unknown or already-run
    /// one-shot id is not an error. A no-op once the coordinator has
    /// stopped.
    pub fn delete(&self, id: impl Into<String>) {
        let _ = self.tx.send(Command::Delete(id.into()));
    }

    /// Signal the coordinator to drain in-flight jobs and stop. Returns
    /// immediately; does not wait for the drain. A no-op if the
    /// coordinator isn't running.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.tx.send(Command::Stop);
        }
    }

    /// Run the coordinator loop on the calling thread. Blocks until
    /// [`Scheduler::stop`] is called from elsewhere and every in-flight
    /// job has returned. A no-op if already running.
    pub fn run(&self) {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let rx = {
            let mut slot = self.rx.lock().unwrap_or_else(|e| e.into_inner());
            match slot.take() {
                Some(rx) => rx,
                None => {
                    self.state.store(IDLE, Ordering::Release);
                    return;
                }
            }
        };

        self.logger.info("scheduler started");
        let mut jobs: Vec<Arc<Entry>> = Vec::new();

        loop {
            let now = Utc::now();
            for entry in &jobs {
                entry.set_next(now);
            }
            jobs.sort_by_key(|entry| entry.next());

            let effective = jobs
                .iter()
                .map(|entry| entry.next())
                .filter(|next| *next > now)
                .min()
                .unwrap_or_else(|| {
                    now + ChronoDuration::from_std(self.config.idle_timer)
                        .unwrap_or_else(|_| ChronoDuration::seconds(600))
                });
            let wait = (effective - now)
                .to_std()
                .unwrap_or(StdDuration::from_secs(0));

            match rx.recv_timeout(wait) {
                Ok(Command::Add(entry)) => jobs.push(entry),
                Ok(Command::Delete(id)) => {
                    self.logger.info(&format!("deleted job {id}"));
                    jobs.retain(|entry| entry.id != id);
                }
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    for entry in jobs.iter().filter(|entry| entry.next() == effective) {
                        dispatch(
                            entry.clone(),
                            self.tx.clone(),
                            self.inflight.clone(),
                        );
                    }
                }
            }
        }

        let (lock, cvar) = &*self.inflight;
        let mut count = lock.lock().unwrap_or_else(|e| e.into_inner());
        while *count > 0 {
            count = cvar.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        drop(count);

        self.logger.info("scheduler stopped");
        self.state.store(IDLE, Ordering::Release);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire `entry` on its own thread, guarded by the entry's own
/// at-most-one-concurrent lock (spec.md §4.F P6). A firing that finds the
/// guard already held is an overrun: the tick is dropped, not queued.
fn dispatch(entry: Arc<Entry>, tx: mpsc::Sender<Command>, inflight: Arc<(Mutex<usize>, Condvar)>) {
    if !entry.try_acquire() {
        return;
    }
    {
        let (lock, _) = &*inflight;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
    thread::spawn(move || {
        let keep_going = entry.run();
        entry.release();
        if !keep_going {
            let _ = tx.send(Command::Delete(entry.id.clone()));
        }
        let (lock, cvar) = &*inflight;
        let mut count = lock.lock().unwrap_or_else(|e| e.into_inner());
        *count -= 1;
        if *count == 0 {
            cvar.notify_all();
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::logger::NopLogger;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn test_scheduler() -> Scheduler {
        Scheduler::with_parts(
            SchedulerConfig {
                idle_timer: StdDuration::from_millis(50),
            },
            Arc::new(SnowflakeIdGen::new()),
            Arc::new(NopLogger),
        )
    }

    #[test]
    fn add_before_run_is_not_running() {
        let scheduler = test_scheduler();
        let err = scheduler
            .add_with_time(Utc::now(), Box::new(|| Ok(())))
            .unwrap_err();
        assert!(matches!(err, CronError::NotRunning));
    }

    #[test]
    fn one_shot_job_fires_once() {
        let scheduler = Arc::new(test_scheduler());
        let runner = scheduler.clone();
        let handle = thread::spawn(move || runner.run());
        thread::sleep(Duration::from_millis(20));

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        scheduler
            .add_with_time(
                Utc::now(),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(300));
        scheduler.stop();
        handle.join().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_prevents_future_firing() {
        let scheduler = Arc::new(test_scheduler());
        let runner = scheduler.clone();
        let handle = thread::spawn(move || runner.run());
        thread::sleep(Duration::from_millis(20));

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let future = Utc::now() + ChronoDuration::milliseconds(200);
        let id = scheduler
            .add_with_time(
                future,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();
        scheduler.delete(id);

        thread::sleep(Duration::from_millis(400));
        scheduler.stop();
        handle.join().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_drains_in_flight_job_before_returning() {
        let scheduler = Arc::new(test_scheduler());
        let runner = scheduler.clone();
        let handle = thread::spawn(move || runner.run());
        thread::sleep(Duration::from_millis(20));

        let done = Arc::new(AtomicUsize::new(0));
        let marker = done.clone();
        scheduler
            .add_with_time(
                Utc::now(),
                Box::new(move || {
                    thread::sleep(Duration::from_millis(150));
                    marker.store(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        scheduler.stop();
        handle.join().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_while_idle_does_not_block() {
        let scheduler = test_scheduler();
        scheduler.stop();
    }

    #[test]
    fn invalid_cron_spec_is_rejected() {
        let scheduler = Arc::new(test_scheduler());
        let runner = scheduler.clone();
        let handle = thread::spawn(move || runner.run());
        thread::sleep(Duration::from_millis(20));

        let err = scheduler
            .add_with_cron("not a valid spec", Box::new(|| Ok(())))
            .unwrap_err();
        assert!(matches!(err, CronError::InvalidParameter(_)));

        scheduler.stop();
        handle.join().unwrap();
    }
}
