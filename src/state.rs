//! Shared state of a running batch.
//!
//! Workers and the timeout thread write into [`BatchState`] concurrently. Each task
//! owns a [`SettleFlag`]; whichever path wins its compare-and-set is the only one
//! allowed to record a result, so a name is written exactly once.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::progress::Progress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Success(String),
    Failure { placeholder: String, cause: String },
    TimedOut(String),
}

impl TaskResult {
    /// The text that goes into the bundle: real source or a placeholder stub.
    pub fn source(&self) -> &str {
        match self {
            Self::Success(source) => source,
            Self::Failure { placeholder, .. } => placeholder,
            Self::TimedOut(placeholder) => placeholder,
        }
    }

    pub fn is_failed(&self) -> bool {
        !matches!(self, Self::Success(_))
    }
}

/// Single-assignment latch shared by a task's worker and its timeout.
#[derive(Debug, Default)]
pub struct SettleFlag(AtomicBool);

impl SettleFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller.
    pub fn try_settle(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_settled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct Inner {
    results: BTreeMap<String, TaskResult>,
    failed: BTreeSet<String>,
    durations: Vec<Duration>,
}

#[derive(Debug)]
pub struct BatchState {
    total: usize,
    inner: Mutex<Inner>,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Records the settled result of `name` and returns the progress it produced.
    /// A second record for the same name is ignored and returns `None`.
    pub fn record(&self, name: &str, result: TaskResult, duration: Duration) -> Option<Progress> {
        let mut inner = self.lock();
        if inner.results.contains_key(name) || inner.results.len() >= self.total {
            return None;
        }
        if result.is_failed() {
            inner.failed.insert(name.to_string());
        }
        inner.results.insert(name.to_string(), result);
        inner.durations.push(duration);
        Some(Progress::new(inner.results.len(), self.total, &inner.durations))
    }

    pub fn completed(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.total
    }

    pub fn progress(&self) -> Progress {
        let inner = self.lock();
        Progress::new(inner.results.len(), self.total, &inner.durations)
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        let inner = self.lock();
        BatchSnapshot {
            total: self.total,
            results: inner.results.clone(),
            failed: inner.failed.clone(),
            durations: inner.durations.clone(),
        }
    }

    // A panicking progress callback never holds this lock, so poisoning only
    // means a thread died between two consistent states.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Consistent copy of the state, taken for the completion callback and the sink.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    pub total: usize,
    pub results: BTreeMap<String, TaskResult>,
    pub failed: BTreeSet<String>,
    pub durations: Vec<Duration>,
}

impl BatchSnapshot {
    /// Name and bundle text of every settled task, in name order.
    pub fn sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results
            .iter()
            .map(|(name, result)| (name.as_str(), result.source()))
    }

    pub fn report(&self, elapsed: Duration) -> BatchReport {
        let mut report = BatchReport {
            total: self.total,
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            failures: Vec::new(),
            output: None,
        };
        for (name, result) in &self.results {
            match result {
                TaskResult::Success(_) => report.succeeded += 1,
                TaskResult::Failure { cause, .. } => {
                    report.failed += 1;
                    report.failures.push(FailureEntry {
                        class_name: name.clone(),
                        reason: cause.clone(),
                    });
                }
                TaskResult::TimedOut(_) => {
                    report.timed_out += 1;
                    report.failures.push(FailureEntry {
                        class_name: name.clone(),
                        reason: "timed out".to_string(),
                    });
                }
            }
        }
        report
    }
}

#[derive(Debug, Serialize)]
pub struct FailureEntry {
    pub class_name: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub elapsed_ms: u64,
    pub failures: Vec<FailureEntry>,
    pub output: Option<String>,
}
