use std::fmt;
use std::str::FromStr;

/// What happens to outstanding reads once one source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchFailurePolicy {
    /// Let in-flight and queued reads finish, then report the first error.
    #[default]
    Drain,
    /// Cancel outstanding reads immediately.
    Cancel,
}

impl fmt::Display for FetchFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailurePolicy::Drain => write!(f, "drain"),
            FetchFailurePolicy::Cancel => write!(f, "cancel"),
        }
    }
}

impl FromStr for FetchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drain" => Ok(FetchFailurePolicy::Drain),
            "cancel" => Ok(FetchFailurePolicy::Cancel),
            other => Err(format!("expected 'drain' or 'cancel', got '{}'", other)),
        }
    }
}
