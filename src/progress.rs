use std::fmt;
use std::time::Duration;

/// Snapshot handed to the progress callback after each settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// `None` until at least one task has settled.
    pub eta: Option<Duration>,
}

impl Progress {
    pub fn new(completed: usize, total: usize, durations: &[Duration]) -> Self {
        Self {
            completed,
            total,
            eta: estimate_remaining(durations, total.saturating_sub(completed)),
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] ", self.completed, self.total)?;
        match self.eta {
            Some(eta) => write!(f, "Estimated remaining time: {}", format_hms(eta)),
            None => write!(f, "Remaining time: Unknown"),
        }
    }
}

/// Mean of the observed durations times the number of tasks still outstanding.
pub fn estimate_remaining(durations: &[Duration], remaining: usize) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let total: u128 = durations.iter().map(Duration::as_nanos).sum();
    let mean = total / durations.len() as u128;
    let eta = mean.saturating_mul(remaining as u128);
    Some(Duration::from_nanos(u64::try_from(eta).unwrap_or(u64::MAX)))
}

/// `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
