//! Hub connect retries with exponential backoff.
//!
//! Attempts are spaced out (1s, 2s, 4s ... capped) so an unreachable endpoint
//! is not hammered. An optional attempt limit lets the session give up and
//! show the failure indicator while the render loops are still running.

use std::time::{Duration, Instant};

use crate::hub::HubSession;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    /// Ceiling for the growing delay.
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Give up after this many failed connects. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

/// Connect bookkeeping: failures so far, the pending delay and when the last
/// attempt happened.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    delay: Duration,
    last_failure: Option<Instant>,
    failures: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            delay: config.initial_delay,
            config,
            last_failure: None,
            failures: 0,
        }
    }

    /// `true` before the first failure and once the pending delay has passed.
    pub fn should_attempt(&self) -> bool {
        self.last_failure.is_none_or(|at| at.elapsed() >= self.delay)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.last_failure = Some(Instant::now());
        let grown = self.delay.mul_f64(self.config.multiplier);
        self.delay = grown.min(self.config.max_delay);
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.delay = self.config.initial_delay;
        self.last_failure = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// The attempt limit has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|limit| self.failures >= limit)
    }
}

/// One connect attempt if the backoff allows it. Returns `true` once the hub
/// is connected; failures are logged with the next retry delay.
pub fn try_connect(state: &mut ReconnectState, hub: &impl HubSession) -> bool {
    if !state.should_attempt() {
        return false;
    }
    if let Err(e) = hub.connect() {
        state.record_failure();
        log::warn!(
            "[hub] connect failed: {e} (attempt {}, retry in {:.1}s)",
            state.consecutive_failures(),
            state.current_delay().as_secs_f64()
        );
        return false;
    }
    state.record_success();
    true
}
