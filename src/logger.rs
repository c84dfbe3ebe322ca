//! Log fan-out.
//!
//! The crate logs through the [`log`] facade. This module provides the
//! matching sink registry: [`register_sink`] installs a process-wide
//! [`log::Log`] implementation that formats every record into a single
//! newline-terminated line (capped at 1024 bytes) and hands it to each
//! registered sink. Sinks stay registered for the lifetime of the process.
//!
//! Applications that already install their own logger (e.g. `env_logger`)
//! can skip this module entirely; the crate does not care who consumes its
//! records.

use std::sync::{Mutex, OnceLock};

use log::{Log, Metadata, Record};

/// Severity handed to registered sinks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    Debug,
    Warning,
    Error,
    Fatal,
}

/// Target used by the crate for conditions that are fatal to an engine but
/// survivable for the loop (wait errors, missing backends).
pub(crate) const FATAL_TARGET: &str = "muxio::fatal";

const MAX_LINE: usize = 1024;

type Sink = Box<dyn Fn(Level, &str) + Send + Sync>;

fn sinks() -> &'static Mutex<Vec<Sink>> {
    static SINKS: OnceLock<Mutex<Vec<Sink>>> = OnceLock::new();
    SINKS.get_or_init(|| Mutex::new(Vec::new()))
}

struct FanOut;

static FAN_OUT: FanOut = FanOut;

impl Log for FanOut {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let level = match record.level() {
            log::Level::Error if record.target() == FATAL_TARGET => Level::Fatal,
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warning,
            log::Level::Info | log::Level::Debug | log::Level::Trace => Level::Debug,
        };
        let mut line = format!("{}", record.args());
        if line.len() > MAX_LINE - 1 {
            line.truncate(MAX_LINE - 1);
        }
        line.push('\n');
        let sinks = sinks().lock().unwrap();
        for sink in sinks.iter() {
            sink(level, &line);
        }
    }

    fn flush(&self) {}
}

/// Registers a log sink, installing the fan-out logger if no global logger
/// is set yet. Returns `false` when another logger claimed the facade first
/// in this call; the sink is kept either way and runs whenever the fan-out
/// logger is the active one.
pub fn register_sink<F>(sink: F) -> bool
where
    F: Fn(Level, &str) + Send + Sync + 'static,
{
    sinks().lock().unwrap().push(Box::new(sink));
    match log::set_logger(&FAN_OUT) {
        Ok(()) => {
            log::set_max_level(log::LevelFilter::Trace);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fan_out_reaches_every_sink() {
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = hits.clone();
            register_sink(move |_, line| {
                assert!(line.ends_with('\n'));
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        log::error!("sink check");
        // Another logger may own the facade when the whole suite runs; only
        // assert when the fan-out actually dispatched.
        let seen = hits.load(Ordering::SeqCst);
        assert!(seen == 0 || seen >= 2);
    }

    #[test]
    fn long_lines_are_capped() {
        let big = "x".repeat(4096);
        let mut line = big.clone();
        if line.len() > MAX_LINE - 1 {
            line.truncate(MAX_LINE - 1);
        }
        line.push('\n');
        assert_eq!(line.len(), MAX_LINE);
    }
}
