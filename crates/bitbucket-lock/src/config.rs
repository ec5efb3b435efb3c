//! Configuration for the lock session client

use std::time::Duration;

/// How the drain wait paces and bounds its status polls
#[derive(Clone, Debug, PartialEq)]
pub struct DrainPolicy {
    /// Delay before the first poll
    pub initial_interval: Duration,
    /// Upper bound for the delay between polls
    pub max_interval: Duration,
    /// Factor applied to the delay after every poll that is not yet drained
    pub multiplier: f64,
    /// Overall limit for the drain wait, `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl DrainPolicy {
    /// Poll at a fixed interval with no overall limit
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            timeout: None,
        }
    }

    /// Set the overall limit for the drain wait
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay to use after `current`, capped at `max_interval`
    pub fn next_interval(&self, current: Duration) -> Duration {
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        current.mul_f64(multiplier).min(self.max_interval)
    }
}

/// Configuration for the maintenance lock client
#[derive(Clone, Debug)]
pub struct LockClientConfig {
    /// Server base address (e.g. "https://bitbucket.example.com")
    pub server_addr: String,
    /// Username for basic authentication
    pub username: String,
    /// Password for basic authentication
    pub password: String,
    /// Connection timeout in milliseconds (default: 5000)
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds (default: 30000)
    pub read_timeout_ms: u64,
    /// Verify the server TLS certificate (default: false)
    pub verify_tls: bool,
    /// Drain wait pacing
    pub drain: DrainPolicy,
}

impl Default for LockClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "https://127.0.0.1:7990".to_string(),
            username: String::new(),
            password: String::new(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
            verify_tls: false,
            drain: DrainPolicy::default(),
        }
    }
}

impl LockClientConfig {
    /// Create a new config for a single server address
    pub fn new(server_addr: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            ..Default::default()
        }
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Set timeouts
    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }

    /// Enable or disable TLS certificate verification
    pub fn with_tls_verification(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Set the drain wait policy
    pub fn with_drain_policy(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }
}
