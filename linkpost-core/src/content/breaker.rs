use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub window_size: usize,
    pub failure_threshold: f64,
    pub open_for: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_threshold: 0.5,
            open_for: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    Proceed,
    ShortCircuit,
}

/// Sliding-window breaker in front of one text provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    outcomes: VecDeque<bool>,
    state: CircuitState,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            outcomes: VecDeque::with_capacity(config.window_size.max(1)),
            state: CircuitState::Closed,
            open_until: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn before_call(&mut self, now: Instant) -> CircuitDecision {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => CircuitDecision::Proceed,
            CircuitState::Open => match self.open_until {
                Some(until) if now < until => CircuitDecision::ShortCircuit,
                _ => {
                    self.state = CircuitState::HalfOpen;
                    CircuitDecision::Proceed
                }
            },
        }
    }

    pub fn record(&mut self, now: Instant, success: bool) {
        match self.state {
            CircuitState::HalfOpen => {
                if success {
                    self.state = CircuitState::Closed;
                    self.outcomes.clear();
                } else {
                    self.trip(now);
                }
            }
            CircuitState::Closed => {
                self.push_outcome(success);
                if self.should_trip() {
                    self.trip(now);
                }
            }
            CircuitState::Open => {
                if success {
                    self.state = CircuitState::HalfOpen;
                } else {
                    self.trip(now);
                }
            }
        }
    }

    fn push_outcome(&mut self, success: bool) {
        if self.outcomes.len() >= self.config.window_size.max(1) {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    // Needs a few samples before a single failure can open the circuit.
    fn should_trip(&self) -> bool {
        let minimum = (self.config.window_size / 4).max(1);
        if self.outcomes.len() < minimum {
            return false;
        }
        let failures = self.outcomes.iter().filter(|outcome| !**outcome).count();
        let rate = failures as f64 / self.outcomes.len() as f64;
        rate > self.config.failure_threshold
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.open_until = Some(now + self.config.open_for);
    }
}
