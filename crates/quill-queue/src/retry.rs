//! Backoff policies for failed task attempts.
//!
//! Every job carries its own [`RetryPolicy`], fixed at enqueue time from the
//! task's options. The queue owns retry scheduling: when an attempt fails
//! transiently, the worker computes the next attempt time from the job's
//! policy and hands the job back to the queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Linear backoff: delay grows by the base amount each attempt.
    Linear,
    /// Exponential backoff: delay doubles each attempt.
    Exponential,
}

impl BackoffStrategy {
    /// Database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
        }
    }

    /// Parses the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "linear" => Some(Self::Linear),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }
}

/// Retry policy stored on each job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Ceiling on the delay between attempts.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) randomizing each delay.
    pub jitter_factor: f64,

    /// Strategy for growing the delay across attempts.
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(512),
            jitter_factor: 0.25,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// A single-attempt policy for tasks whose failures are terminal by
    /// nature (import parsing, export assembly).
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before the attempt following failed attempt number
    /// `failed_attempt` (1-based).
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay * failed_attempt,
            BackoffStrategy::Exponential => {
                let exponent = failed_attempt.saturating_sub(1).min(20);
                self.base_delay * 2_u32.saturating_pow(exponent)
            },
        };

        let capped = std::cmp::min(base, self.max_delay);
        std::cmp::min(apply_jitter(capped, self.jitter_factor), self.max_delay)
    }

    /// Absolute time of the next attempt after a failure at `failed_at`.
    pub fn next_attempt_at(&self, failed_attempt: u32, failed_at: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.delay_for_attempt(failed_attempt);
        failed_at + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero())
    }
}

/// Randomizes a delay by ±`jitter_factor` to spread retry load.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(policy: RetryPolicy) -> RetryPolicy {
        RetryPolicy { jitter_factor: 0.0, ..policy }
    }

    #[test]
    fn exponential_delays_double() {
        let policy = no_jitter(RetryPolicy::default());

        let delays: Vec<Duration> = (1..=5).map(|a| policy.delay_for_attempt(a)).collect();

        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert_eq!(delays[2], Duration::from_secs(4));
        assert_eq!(delays[3], Duration::from_secs(8));
        assert_eq!(delays[4], Duration::from_secs(16));
    }

    #[test]
    fn linear_delays_grow_by_base() {
        let policy = no_jitter(RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        });

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(15));
    }

    #[test]
    fn fixed_delays_do_not_grow() {
        let policy = no_jitter(RetryPolicy {
            strategy: BackoffStrategy::Fixed,
            base_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        });

        for attempt in 1..=5 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_secs(10));
        }
    }

    #[test]
    fn max_delay_caps_growth() {
        let policy = no_jitter(RetryPolicy {
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::default()
        });

        assert!(policy.delay_for_attempt(12) <= Duration::from_secs(60));
    }

    #[test]
    fn jitter_varies_delay_within_bounds() {
        let base = Duration::from_secs(10);
        let mut seen = std::collections::HashSet::new();

        for _ in 0..20 {
            let jittered = apply_jitter(base, 0.5);
            assert!(jittered >= Duration::from_secs(5), "delay too small: {jittered:?}");
            assert!(jittered <= Duration::from_secs(15), "delay too large: {jittered:?}");
            seen.insert(jittered.as_millis());
        }

        assert!(seen.len() > 1, "jitter should create variation");
    }

    #[test]
    fn next_attempt_at_is_relative_to_failure() {
        let policy = no_jitter(RetryPolicy::default());
        let failed_at = Utc::now();

        let next = policy.next_attempt_at(2, failed_at);

        assert_eq!((next - failed_at).num_seconds(), 2);
    }

    #[test]
    fn no_retry_policy_allows_single_attempt() {
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }

    #[test]
    fn strategy_round_trips_through_database_form() {
        for strategy in
            [BackoffStrategy::Fixed, BackoffStrategy::Linear, BackoffStrategy::Exponential]
        {
            assert_eq!(BackoffStrategy::parse(strategy.as_str()), Some(strategy));
        }
        assert_eq!(BackoffStrategy::parse("quadratic"), None);
    }
}
