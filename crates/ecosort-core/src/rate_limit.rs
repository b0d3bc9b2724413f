//! Per-client sliding-window rate limiting.
//!
//! Each client identity owns a deque of the instants at which it was
//! admitted. An admission check prunes instants that have left the window,
//! then admits (and records `now`) only while fewer than `limit` remain.
//! Denials record nothing, so a client's deque never holds more than `limit`
//! entries no matter how hard it retries.
//!
//! All state sits behind one mutex and every check is a single critical
//! section, so admissions for a client are linearizable and a cancelled
//! request can never leave a half-applied update.
//!
//! State is per process. Replicated deployments get one independent quota
//! per worker.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::Limits;

/// How many admissions pass between full sweeps of idle clients.
const SWEEP_EVERY: u64 = 256;

/// Key used to partition rate-limit state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Identity for an authenticated caller, keyed by API key fingerprint.
    pub fn from_key_fingerprint(fingerprint: &str) -> Self {
        Self(format!("key:{}", fingerprint))
    }

    /// Identity for an anonymous caller, keyed by network address.
    pub fn from_ip(ip: impl fmt::Display) -> Self {
        Self(format!("ip:{}", ip))
    }

    /// The identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Allowed {
        /// Admissions left in the current window.
        remaining: usize,
    },
    /// The client is over its quota.
    Denied {
        /// Time until the oldest admission leaves the window.
        retry_after: Duration,
    },
}

impl Admission {
    /// Returns true if the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Default)]
struct LimiterState {
    clients: HashMap<ClientId, VecDeque<Instant>>,
    checks: u64,
}

/// Sliding-window admission gate keyed by client identity.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter admitting `limit` requests per `window` per client.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Creates a limiter from configured limits.
    pub fn from_limits(limits: &Limits) -> Self {
        Self::new(limits.requests_per_window, limits.window)
    }

    /// Admissions allowed per window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Checks and, if allowed, records an admission for `client` at `now`.
    pub fn admit(&self, client: &ClientId, now: Instant) -> Admission {
        let mut state = self.state.lock();
        state.checks += 1;
        if state.checks % SWEEP_EVERY == 0 {
            Self::sweep(&mut state.clients, self.window, now);
        }

        let window = self.window;
        let limit = self.limit;

        let timestamps = state.clients.entry(client.clone()).or_default();
        Self::prune(timestamps, window, now);

        if timestamps.len() < limit {
            timestamps.push_back(now);
            let remaining = limit - timestamps.len();
            return Admission::Allowed { remaining };
        }

        let retry_after = timestamps
            .front()
            .map(|oldest| (*oldest + window).saturating_duration_since(now))
            .unwrap_or(window);

        // A zero limit leaves an empty record behind; drop it.
        if timestamps.is_empty() {
            state.clients.remove(client);
        }

        warn!(client = %client, retry_after_ms = retry_after.as_millis() as u64, "Rate limit exceeded");
        Admission::Denied { retry_after }
    }

    /// Number of clients with live state.
    pub fn tracked_clients(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Drops every client whose window has fully elapsed at `now`.
    pub fn purge_expired(&self, now: Instant) {
        let mut state = self.state.lock();
        Self::sweep(&mut state.clients, self.window, now);
    }

    /// Removes instants that are no longer inside the window ending at `now`.
    fn prune(timestamps: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn sweep(clients: &mut HashMap<ClientId, VecDeque<Instant>>, window: Duration, now: Instant) {
        let before = clients.len();
        clients.retain(|_, timestamps| {
            Self::prune(timestamps, window, now);
            !timestamps.is_empty()
        });
        let removed = before - clients.len();
        if removed > 0 {
            debug!(removed, remaining = clients.len(), "Swept idle rate-limit records");
        }
    }
}
