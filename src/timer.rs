//! One background thread that fires scheduled actions at their deadlines.
//!
//! Used for per-task timeouts so that waiting for a deadline never occupies a
//! worker slot. Dropping the timer (or calling [`TimeoutTimer::shutdown`]) stops the
//! thread and discards actions that have not fired yet.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

type Action = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    deadline: Instant,
    seq: u64,
    action: Action,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest deadline, FIFO among equals.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct TimeoutTimer {
    tx: Option<Sender<(Instant, Action)>>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutTimer {
    pub fn new() -> std::io::Result<Self> {
        let (tx, rx) = std::sync::mpsc::channel::<(Instant, Action)>();
        let handle = std::thread::Builder::new()
            .name("batch-timeout".to_string())
            .spawn(move || run_timer(rx))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Runs `action` on the timer thread once `deadline` has passed.
    pub fn schedule(&self, deadline: Instant, action: impl FnOnce() + Send + 'static) {
        if let Some(tx) = self.tx.as_ref() {
            let _ = tx.send((deadline, Box::new(action)));
        }
    }

    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimeoutTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer(rx: Receiver<(Instant, Action)>) {
    let mut queue: BinaryHeap<Scheduled> = BinaryHeap::new();
    let mut next_seq = 0u64;

    loop {
        let now = Instant::now();
        while queue.peek().is_some_and(|next| next.deadline <= now) {
            if let Some(due) = queue.pop() {
                (due.action)();
            }
        }

        let received = match queue.peek() {
            Some(next) => rx.recv_timeout(next.deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok((deadline, action)) => {
                queue.push(Scheduled {
                    deadline,
                    seq: next_seq,
                    action,
                });
                next_seq += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
