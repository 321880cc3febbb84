//! An in-process, recurring-job scheduler: parse crontab-style expressions
//! into a time oracle, then run a coordinator loop that fires jobs at
//! their next instant, at most once concurrently per job, draining
//! in-flight work cleanly on stop.
//!
//! The crate is organized around two halves. [`bitset`] and [`parser`]
//! compile a six-field crontab expression into per-field bitmasks;
//! [`schedule`] turns those masks into a [`schedule::Schedule`] that
//! answers "what's the next matching instant after this one". [`entry`]
//! and [`scheduler`] build the event loop on top: a [`scheduler::Scheduler`]
//! owns a set of [`entry::Entry`] values and runs them as they come due.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! use cronweave::Scheduler;
//!
//! let scheduler = Arc::new(Scheduler::new());
//! let runner = scheduler.clone();
//! let handle = thread::spawn(move || runner.run());
//!
//! // give the coordinator a moment to start before registering work
//! thread::sleep(Duration::from_millis(10));
//! scheduler.add_with_cron("* * * * * *", Box::new(|| Ok(()))).unwrap();
//!
//! scheduler.stop();
//! handle.join().unwrap();
//! ```

pub mod bitset;
pub mod entry;
pub mod error;
pub mod idgen;
pub mod logger;
pub mod parser;
pub mod schedule;
pub mod scheduler;

pub use entry::{Entry, JobError, JobFn};
pub use error::{CronError, Result};
pub use idgen::{IdGen, SnowflakeIdGen};
pub use logger::{Logger, NopLogger, StderrLogger};
pub use schedule::{parse, parse_in_timezone, FixedSchedule, Schedule, TimeSchedule};
pub use scheduler::{Scheduler, SchedulerConfig};
