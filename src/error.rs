use std::fmt;
use std::num;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CronError>;

/// All failure modes the core surfaces. Spec.md §7 groups parser failures
/// into a single "invalid parameter" kind rather than distinguishing the
/// exact grammar violation; `InvalidParameter`'s message carries the detail
/// for humans, but callers should not match on it.
#[derive(Debug, Clone)]
pub enum CronError {
    /// Wrong token count, a malformed number, or more than two `-`/`/`
    /// components in a single range term.
    InvalidParameter(String),
    /// `add()` was called before the coordinator's `run()` loop started
    /// receiving (spec.md §9 open question 4).
    NotRunning,
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::NotRunning => write!(f, "scheduler is not running"),
        }
    }
}

impl std::error::Error for CronError {}

impl From<num::ParseIntError> for CronError {
    fn from(err: num::ParseIntError) -> Self {
        Self::InvalidParameter(err.to_string())
    }
}
