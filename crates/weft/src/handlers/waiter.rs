// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The synchronous-wait primitive behind blocking requests.
//!
//! A caller parks on the waiter after sending its request; the reception
//! worker delivers the response from its own thread. Teardown closes the
//! waiter so blocked callers return promptly instead of riding out their
//! full timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct WaitState {
    reply: Option<(Vec<u8>, bool)>,
    closed: bool,
}

/// A one-shot parked slot for a response.
pub(crate) struct Waiter {
    state: Mutex<WaitState>,
    cv: Condvar,
}

impl Waiter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WaitState::default()),
            cv: Condvar::new(),
        })
    }

    /// Deliver the response payload and the replier's result flag.
    pub(crate) fn deliver(&self, data: Vec<u8>, result: bool) {
        let mut state = self.state.lock();
        if state.reply.is_none() {
            state.reply = Some((data, result));
        }
        self.cv.notify_all();
    }

    /// Unpark without a reply (runtime teardown).
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.cv.notify_all();
    }

    /// Block until a reply arrives, the waiter closes, or the timeout
    /// elapses. Returns the reply if one was delivered.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<(Vec<u8>, bool)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(reply) = state.reply.take() {
                return Some(reply);
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            self.cv.wait_for(&mut state, deadline - now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_across_threads() {
        let waiter = Waiter::new();
        let remote = waiter.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.deliver(vec![7], true);
        });
        let (data, result) = waiter.wait_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(data, vec![7]);
        assert!(result);
        t.join().unwrap();
    }

    #[test]
    fn times_out_without_reply() {
        let waiter = Waiter::new();
        let start = Instant::now();
        assert!(waiter.wait_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn close_unparks_immediately() {
        let waiter = Waiter::new();
        let remote = waiter.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.close();
        });
        let start = Instant::now();
        assert!(waiter.wait_timeout(Duration::from_secs(10)).is_none());
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn reply_beats_close() {
        let waiter = Waiter::new();
        waiter.deliver(vec![1], false);
        waiter.close();
        let (data, result) = waiter.wait_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(data, vec![1]);
        assert!(!result);
    }
}
