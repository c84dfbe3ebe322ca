#![allow(dead_code)]

use std::time::{Duration, Instant};

use muxio::{Config, Reactor};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A reactor with a test-friendly collection grace.
pub fn reactor() -> Reactor {
    init();
    Reactor::with_config(Config::new().gc_grace(Duration::from_millis(50)))
        .expect("failed to build reactor")
}

pub fn reactor_with(config: Config) -> Reactor {
    init();
    Reactor::with_config(config).expect("failed to build reactor")
}

/// Ticks the reactor until the condition holds, panicking on timeout.
pub fn run_until<F>(reactor: &mut Reactor, timeout: Duration, mut done: F)
where
    F: FnMut(&mut Reactor) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if done(reactor) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "condition not reached within {:?}",
            timeout
        );
        reactor
            .poll_once(Some(Duration::from_millis(20)))
            .expect("poll failed");
    }
}

/// Ticks the reactor for a fixed span regardless of what happens.
pub fn run_for(reactor: &mut Reactor, span: Duration) {
    let deadline = Instant::now() + span;
    while Instant::now() < deadline {
        reactor
            .poll_once(Some(Duration::from_millis(20)))
            .expect("poll failed");
    }
}
