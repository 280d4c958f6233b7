// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The reception worker.
//!
//! One background thread per runtime drains the inbound queue the socket
//! readers feed, dispatching each message to the role-specific handler.
//! The poll is bounded so the exit flag is observed every iteration; a
//! malformed message is discarded by its handler and never terminates
//! the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::Runtime;
use crate::transport::{Inbound, SocketRole};

/// Bounded poll interval between exit-flag checks.
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

pub(super) fn run_reception_task(
    runtime: Weak<Runtime>,
    rx: Receiver<Inbound>,
    exit: Arc<AtomicBool>,
) {
    loop {
        match rx.recv_timeout(POLL_TIMEOUT) {
            Ok(inbound) => {
                // The runtime going away means teardown has begun.
                let Some(runtime) = runtime.upgrade() else {
                    break;
                };
                match inbound.role {
                    SocketRole::Sub => runtime.recv_msg_update(&inbound.frames),
                    SocketRole::Control => runtime.recv_control_update(&inbound.frames),
                    SocketRole::Request => runtime.recv_srv_request(&inbound.frames),
                    SocketRole::Response => runtime.recv_srv_response(&inbound.frames),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if exit.load(Ordering::Relaxed) {
            break;
        }
    }
    log::debug!("reception worker stopped");
}
