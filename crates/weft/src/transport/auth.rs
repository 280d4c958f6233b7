// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PLAIN authentication worker.
//!
//! When `IGNITION_TRANSPORT_USERNAME` and `IGNITION_TRANSPORT_PASSWORD`
//! are both present at initialization, the publisher endpoint requires
//! matching credentials in the subscriber handshake. Verification runs on
//! a dedicated worker answering challenges over a channel, so the
//! configured secret never leaves one thread. Only pub/sub is gated;
//! service sockets are not authenticated.

use crossbeam_channel::{bounded, unbounded, Sender};
use std::time::Duration;

/// Authentication domain reported in logs.
pub(crate) const AUTH_DOMAIN: &str = "weft-auth";

struct Challenge {
    username: String,
    password: String,
    reply: Sender<bool>,
}

/// Handle to the authentication worker.
#[derive(Clone)]
pub(crate) struct AuthGate {
    tx: Sender<Challenge>,
}

impl AuthGate {
    /// Read credentials from the environment; `None` unless both variables
    /// are set.
    pub(crate) fn credentials_from_env() -> Option<(String, String)> {
        let username = std::env::var("IGNITION_TRANSPORT_USERNAME").ok()?;
        let password = std::env::var("IGNITION_TRANSPORT_PASSWORD").ok()?;
        Some((username, password))
    }

    /// Start the worker holding the expected credentials. The worker exits
    /// when the last gate handle is dropped.
    pub(crate) fn start(username: String, password: String) -> Self {
        let (tx, rx) = unbounded::<Challenge>();
        let spawned = std::thread::Builder::new()
            .name("weft-auth".to_string())
            .spawn(move || {
                while let Ok(challenge) = rx.recv() {
                    let ok =
                        challenge.username == username && challenge.password == password;
                    if !ok {
                        log::warn!(
                            "{}: rejected credentials for user [{}]",
                            AUTH_DOMAIN,
                            challenge.username
                        );
                    }
                    let _ = challenge.reply.send(ok);
                }
            });
        if let Err(e) = spawned {
            log::error!("{}: failed to start auth worker: {}", AUTH_DOMAIN, e);
        }
        Self { tx }
    }

    /// Verify a username/password pair. Denies on any worker failure.
    pub(crate) fn check(&self, username: &str, password: &str) -> bool {
        let (reply_tx, reply_rx) = bounded(1);
        let challenge = Challenge {
            username: username.to_string(),
            password: password.to_string(),
            reply: reply_tx,
        };
        if self.tx.send(challenge).is_err() {
            return false;
        }
        reply_rx.recv_timeout(Duration::from_secs(1)).unwrap_or(false)
    }
}
