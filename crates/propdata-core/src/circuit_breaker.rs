use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ServiceId;

/// Runtime circuit state for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "halfOpen",
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Permission to make one call, as granted by [`CircuitBreaker::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The circuit was closed.
    Normal,
    /// The single half-open probe, tagged with the probe generation it holds.
    Probe(u64),
}

impl Admission {
    pub const fn is_probe(self) -> bool {
        matches!(self, Self::Probe(_))
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
    probe_in_flight: bool,
    probe_generation: u64,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            next_attempt_at: None,
            probe_in_flight: false,
            probe_generation: 0,
        }
    }
}

impl Circuit {
    fn grant_probe(&mut self) -> Admission {
        self.probe_generation = self.probe_generation.wrapping_add(1);
        self.probe_in_flight = true;
        Admission::Probe(self.probe_generation)
    }

    fn holds_probe(&self, admission: Admission) -> bool {
        match admission {
            Admission::Normal => false,
            Admission::Probe(generation) => {
                self.state == CircuitState::HalfOpen
                    && self.probe_in_flight
                    && self.probe_generation == generation
            }
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.next_attempt_at = None;
        self.probe_in_flight = false;
    }
}

/// Point-in-time view of one service's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    pub next_attempt_at: Option<Instant>,
}

/// Thread-safe circuit breaker holding one circuit per service.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<ServiceId, Circuit>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<ServiceId, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether a real call may be attempted now.
    ///
    /// Callers that need to hand a probe slot back should use [`Self::admit`]
    /// and keep the returned ticket.
    pub fn can_make_request(&self, service: ServiceId) -> bool {
        self.admit(service).is_some()
    }

    /// Admits one call, or refuses it with `None`.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open and
    /// grants exactly one probe; later callers are refused until the probe's
    /// outcome is recorded or its holder releases it.
    pub fn admit(&self, service: ServiceId) -> Option<Admission> {
        let now = Instant::now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(service).or_default();

        match circuit.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    None
                } else {
                    Some(circuit.grant_probe())
                }
            }
            CircuitState::Open => {
                let can_probe = circuit
                    .next_attempt_at
                    .map(|next_attempt_at| now >= next_attempt_at)
                    .unwrap_or(true);

                if can_probe {
                    info!(service = service.as_str(), "circuit half-open; allowing probe");
                    circuit.state = CircuitState::HalfOpen;
                    Some(circuit.grant_probe())
                } else {
                    None
                }
            }
        }
    }

    pub fn record_success(&self, service: ServiceId) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(service).or_default();
        if circuit.state != CircuitState::Closed {
            info!(service = service.as_str(), "circuit closed after successful call");
        }
        circuit.close();
    }

    pub fn record_failure(&self, service: ServiceId) {
        let now = Instant::now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(service).or_default();
        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
        circuit.last_failure_at = Some(now);

        if circuit.state == CircuitState::HalfOpen
            || circuit.consecutive_failures >= self.config.failure_threshold
        {
            if circuit.state != CircuitState::Open {
                warn!(
                    service = service.as_str(),
                    failures = circuit.consecutive_failures,
                    reset_secs = self.config.reset_timeout.as_secs(),
                    "circuit opened"
                );
            }
            circuit.state = CircuitState::Open;
            circuit.next_attempt_at = Some(now + self.config.reset_timeout);
            circuit.probe_in_flight = false;
        } else {
            debug!(
                service = service.as_str(),
                failures = circuit.consecutive_failures,
                "recorded service failure"
            );
        }
    }

    /// The service answered, but with an error that says nothing about its health.
    ///
    /// Closes a half-open circuit when `admission` is the current probe; the
    /// closed-state counter is left as is.
    pub fn record_reachable(&self, service: ServiceId, admission: Admission) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(service).or_default();
        if circuit.holds_probe(admission) {
            info!(service = service.as_str(), "circuit closed; probe reached service");
            circuit.close();
        }
    }

    /// Returns an unanswered probe slot, e.g. when the probing call was cancelled.
    ///
    /// Tickets from earlier probes, or from calls admitted while closed, are ignored.
    pub fn release_probe(&self, service: ServiceId, admission: Admission) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(&service) {
            if circuit.holds_probe(admission) {
                debug!(service = service.as_str(), "probe slot released");
                circuit.probe_in_flight = false;
            }
        }
    }

    pub fn snapshot(&self, service: ServiceId) -> CircuitSnapshot {
        let circuits = self.lock_circuits();
        match circuits.get(&service) {
            Some(circuit) => CircuitSnapshot {
                state: circuit.state,
                consecutive_failures: circuit.consecutive_failures,
                last_failure_at: circuit.last_failure_at,
                next_attempt_at: circuit.next_attempt_at,
            },
            None => CircuitSnapshot {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                next_attempt_at: None,
            },
        }
    }

    pub fn state(&self, service: ServiceId) -> CircuitState {
        self.snapshot(service).state
    }

    pub fn consecutive_failures(&self, service: ServiceId) -> u32 {
        self.snapshot(service).consecutive_failures
    }
}
