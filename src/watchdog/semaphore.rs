//! Counting semaphore and one-shot latch
//!
//! Used for the two handshakes between the protecting call and its
//! supervisor thread: "peer connected" and "shutdown finished".

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Semaphore errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreError {
    #[error("semaphore closed while waiting")]
    Closed,
}

#[derive(Debug, Default)]
struct SemState {
    count: usize,
    closed: bool,
}

/// Counting semaphore that can be closed to release every waiter with an
/// error
#[derive(Debug, Default)]
pub struct Semaphore {
    state: Mutex<SemState>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            state: Mutex::new(SemState {
                count: initial,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Add one permit and wake a waiter
    pub fn post(&self) {
        let mut state = self.state.lock();
        state.count += 1;
        self.available.notify_one();
    }

    /// Take a permit, blocking until one is available.
    ///
    /// Permits posted before the close are still handed out.
    pub fn wait(&self) -> Result<(), SemaphoreError> {
        let mut state = self.state.lock();
        loop {
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }
            if state.closed {
                return Err(SemaphoreError::Closed);
            }
            self.available.wait(&mut state);
        }
    }

    /// Release every current and future waiter once permits run out
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Drop all permits and reopen
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        state.closed = false;
    }

    pub fn available(&self) -> usize {
        self.state.lock().count
    }
}

/// One-shot signal: opening it any number of times posts exactly once
#[derive(Debug, Default)]
pub struct Latch {
    opened: AtomicBool,
    sem: Semaphore,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch; returns true only for the call that opened it
    pub fn open(&self) -> bool {
        let first = !self.opened.swap(true, Ordering::SeqCst);
        if first {
            self.sem.post();
        }
        first
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// Block until the latch opens. Fails if it was abandoned first.
    pub fn wait(&self) -> Result<(), SemaphoreError> {
        self.sem.wait()?;
        // Leave the permit for any other waiter.
        self.sem.post();
        Ok(())
    }

    /// Give up on the latch, failing current and future waiters
    pub fn abandon(&self) {
        self.sem.close();
    }
}
