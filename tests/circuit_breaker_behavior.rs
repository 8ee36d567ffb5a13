//! Behavior-driven tests for the per-source circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use gridpulse_core::{Backoff, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use tokio::time::Instant;

fn breaker(threshold: u32, max_backoff_steps: u32) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        "upstream",
        CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Backoff::Exponential {
                base: Duration::from_secs(60),
                factor: 2.0,
                max: Duration::from_secs(600),
            },
            max_backoff_steps,
        },
    ))
}

fn fail(breaker: &Arc<CircuitBreaker>, now: Instant) {
    breaker
        .try_acquire_at(now)
        .expect("admitted")
        .record_at(false, now);
}

#[tokio::test]
async fn circuit_opens_only_at_the_threshold() {
    // Given: A breaker that opens after three failures
    let breaker = breaker(3, 3);
    let now = Instant::now();

    // When: Two calls fail
    fail(&breaker, now);
    fail(&breaker, now);

    // Then: The circuit stays closed until the third
    assert_eq!(breaker.state(), CircuitState::Closed);
    fail(&breaker, now);
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.should_attempt_at(now + Duration::from_secs(59)));
}

#[tokio::test]
async fn success_resets_the_failure_count() {
    // Given: Two failures then a success
    let breaker = breaker(3, 3);
    let now = Instant::now();
    fail(&breaker, now);
    fail(&breaker, now);
    breaker.try_acquire_at(now).expect("admitted").record_at(true, now);

    // When: Another failure follows
    fail(&breaker, now);

    // Then: The count restarted, so the circuit is still closed
    assert_eq!(breaker.consecutive_failures(), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn only_one_trial_call_is_admitted_after_cooldown() {
    // Given: An open circuit whose cooldown has elapsed
    let breaker = breaker(1, 3);
    let opened = Instant::now();
    fail(&breaker, opened);
    let later = opened + Duration::from_secs(60);

    // When: Two callers ask to attempt at the same moment
    let first = breaker.try_acquire_at(later);
    let second = breaker.try_acquire_at(later);

    // Then: Exactly one trial is handed out
    let trial = first.expect("trial admitted");
    assert!(trial.is_trial());
    assert!(second.is_none());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    trial.record_at(true, later);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn failed_trials_escalate_the_cooldown_up_to_the_retry_budget() {
    // Given: A circuit limited to two escalation steps
    let breaker = breaker(1, 2);
    let mut now = Instant::now();
    fail(&breaker, now);

    // When: Three trials fail in a row
    let mut cooldowns = Vec::new();
    for _ in 0..3 {
        now += breaker
            .status_at(now)
            .cooldown_remaining
            .expect("circuit is open");
        fail(&breaker, now);
        cooldowns.push(breaker.status_at(now).cooldown_remaining.expect("re-opened"));
    }

    // Then: The cooldown doubles, then stops growing at the budget
    assert_eq!(
        cooldowns,
        [
            Duration::from_secs(120),
            Duration::from_secs(240),
            Duration::from_secs(240)
        ]
    );
}

#[tokio::test]
async fn reopened_circuit_rejects_calls_until_the_new_cooldown_ends() {
    // Given: A trial call that fails after the first cooldown
    let breaker = breaker(1, 3);
    let opened = Instant::now();
    fail(&breaker, opened);
    let reopened_at = opened + Duration::from_secs(60);
    fail(&breaker, reopened_at);
    let cooldown = Duration::from_secs(120);

    // When / Then: Nothing is admitted one second before the escalated cooldown ends
    let almost = reopened_at + cooldown - Duration::from_secs(1);
    assert!(!breaker.should_attempt_at(almost));
    assert!(breaker.try_acquire_at(almost).is_none());
    assert_eq!(breaker.state(), CircuitState::Open);

    // And: The next trial is admitted once it has
    let trial = breaker
        .try_acquire_at(reopened_at + cooldown)
        .expect("cooldown elapsed");
    assert!(trial.is_trial());
    trial.record_at(true, reopened_at + cooldown);
}

#[tokio::test]
async fn abandoned_attempt_counts_as_failure() {
    // Given: A breaker that opens on the first failure
    let breaker = breaker(1, 3);

    // When: An admitted attempt is dropped without reporting
    drop(breaker.try_acquire().expect("admitted"));

    // Then: The drop is recorded as a failure
    assert_eq!(breaker.consecutive_failures(), 1);
    assert_eq!(breaker.state(), CircuitState::Open);
}
