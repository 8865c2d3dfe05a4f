//! Failure classification and cooldown policy
//!
//! | Outcome          | Trigger                         | Cooldown                          |
//! |------------------|---------------------------------|-----------------------------------|
//! | `RateLimited`    | 429                             | `cooldown_max_ms`                 |
//! | `Overloaded`     | 503, 504                        | `backoff(consecutive_failures)`   |
//! | `TransportError` | timeout, refused, DNS           | `backoff(consecutive_failures)`   |
//! | `ServerError`    | any other 5xx                   | `cooldown_base_ms`                |
//! | `ClientError`    | any other 4xx                   | none, health untouched            |
//! | `Unexpected`     | 1xx / 3xx                       | none, health untouched            |

use rand::Rng;
use reqwest::StatusCode;

use crate::config::RoutingConfig;

/// Classified result of one upstream attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    Overloaded,
    ServerError,
    ClientError,
    Unexpected,
    TransportError,
}

impl AttemptOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=299 => Self::Success,
            429 => Self::RateLimited,
            503 | 504 => Self::Overloaded,
            500..=599 => Self::ServerError,
            400..=499 => Self::ClientError,
            _ => Self::Unexpected,
        }
    }

    /// Metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate_limited",
            Self::Overloaded => "overloaded",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::Unexpected => "unexpected_status",
            Self::TransportError => "transport_error",
        }
    }

    /// Whether this outcome counts against the gateway's health
    pub fn penalizes(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Overloaded | Self::ServerError | Self::TransportError
        )
    }
}

/// Cooldown durations derived from routing configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownPolicy {
    base_ms: u64,
    max_ms: u64,
    jitter: f64,
}

impl CooldownPolicy {
    pub fn new(base_ms: u64, max_ms: u64, jitter: f64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter,
        }
    }

    pub fn from_config(routing: &RoutingConfig) -> Self {
        Self::new(
            routing.cooldown_base_ms,
            routing.cooldown_max_ms,
            routing.backoff_jitter,
        )
    }

    pub fn base_ms(&self) -> u64 {
        self.base_ms
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    /// `min(base * 2^(failures-1), max)`; `failures` below 1 is treated as 1
    pub fn backoff_ms(&self, failures: u32) -> u64 {
        let exponent = failures.max(1) - 1;
        let factor = 2u64.saturating_pow(exponent);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }

    /// Cooldown for `outcome`, where `failures` already includes this failure
    ///
    /// `None` means the outcome does not touch health.
    pub fn cooldown_ms(&self, outcome: AttemptOutcome, failures: u32) -> Option<u64> {
        match outcome {
            AttemptOutcome::RateLimited => Some(self.max_ms),
            AttemptOutcome::Overloaded | AttemptOutcome::TransportError => {
                Some(self.with_jitter(self.backoff_ms(failures)))
            }
            AttemptOutcome::ServerError => Some(self.base_ms),
            AttemptOutcome::Success | AttemptOutcome::ClientError | AttemptOutcome::Unexpected => {
                None
            }
        }
    }

    fn with_jitter(&self, backoff_ms: u64) -> u64 {
        let spread = backoff_ms as f64 * self.jitter;
        if spread < 1.0 {
            return backoff_ms;
        }
        let extra = rand::rng().random_range(0.0..spread) as u64;
        backoff_ms.saturating_add(extra).min(self.max_ms)
    }
}
