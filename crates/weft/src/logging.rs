// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stderr logger behind the `log` facade.
//!
//! The runtime installs this logger once, on first construction. Setting
//! `IGN_VERBOSE=1` raises the maximum level to `Debug`; otherwise only
//! warnings and errors are emitted. Applications that install their own
//! `log` implementation first win; installation here is best-effort.

use std::io::Write;
use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};

static INIT: Once = Once::new();

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "E",
            Level::Warn => "W",
            Level::Info => "I",
            Level::Debug => "D",
            Level::Trace => "T",
        };
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "[weft:{}] {}", tag, record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Whether `IGN_VERBOSE=1` is set in the environment.
pub(crate) fn verbose() -> bool {
    std::env::var("IGN_VERBOSE").map(|v| v == "1").unwrap_or(false)
}

/// Install the stderr logger. Safe to call repeatedly from any thread.
pub(crate) fn init() {
    INIT.call_once(|| {
        let level = if verbose() {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        };
        // Ignore the error: the application may have installed its own logger.
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        log::warn!("logger installed");
    }
}
