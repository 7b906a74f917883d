//! Stack poller tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_test::assert_ok;

use deployctl::deploy::poller::{wait_for_stack, PollOutcome, PollPolicy};
use deployctl::models::stack::StackState;
use deployctl::utils::CooldownOptions;

use crate::support::{recording_sleep, StubOrchestration};

fn policy(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        cooldown: CooldownOptions {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        },
        max_attempts,
    }
}

#[tokio::test]
async fn test_poll_until_settled() {
    let service = StubOrchestration::with_states(&[
        StackState::CreateInProgress,
        StackState::CreateInProgress,
        StackState::CreateComplete,
    ]);
    let delays = Arc::new(Mutex::new(Vec::new()));

    let outcome = assert_ok!(
        wait_for_stack(
            &service,
            "app-stack",
            "us-west-2",
            &policy(10),
            recording_sleep(delays.clone()),
        )
        .await
    );

    assert_eq!(outcome, PollOutcome::Settled(StackState::CreateComplete));
    assert_eq!(service.describe_count(), 3);
    assert_eq!(
        *delays.lock().unwrap(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );
}

#[tokio::test]
async fn test_poll_is_bounded() {
    let service = StubOrchestration::with_states(&[StackState::UpdateInProgress]);
    let delays = Arc::new(Mutex::new(Vec::new()));

    let outcome = assert_ok!(
        wait_for_stack(
            &service,
            "app-stack",
            "us-west-2",
            &policy(4),
            recording_sleep(delays.clone()),
        )
        .await
    );

    assert_eq!(
        outcome,
        PollOutcome::StillInProgress {
            last: StackState::UpdateInProgress,
            attempts: 4,
        }
    );
    assert_eq!(service.describe_count(), 4);
    // no sleep after the last check, delays capped at the maximum
    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20),
        ]
    );
}

#[tokio::test]
async fn test_rollback_settles() {
    let service = StubOrchestration::with_states(&[
        StackState::CreateInProgress,
        StackState::Rollback("ROLLBACK_IN_PROGRESS".to_string()),
        StackState::Rollback("ROLLBACK_COMPLETE".to_string()),
    ]);
    let delays = Arc::new(Mutex::new(Vec::new()));

    let outcome = assert_ok!(
        wait_for_stack(
            &service,
            "app-stack",
            "us-west-2",
            &policy(10),
            recording_sleep(delays),
        )
        .await
    );

    assert_eq!(
        outcome,
        PollOutcome::Settled(StackState::Rollback("ROLLBACK_COMPLETE".to_string()))
    );
}

#[tokio::test]
async fn test_zero_attempts_still_checks_once() {
    let service = StubOrchestration::with_states(&[StackState::CreateInProgress]);
    let delays = Arc::new(Mutex::new(Vec::new()));

    let outcome = assert_ok!(
        wait_for_stack(
            &service,
            "app-stack",
            "us-west-2",
            &policy(0),
            recording_sleep(delays.clone()),
        )
        .await
    );

    assert!(matches!(outcome, PollOutcome::StillInProgress { attempts: 1, .. }));
    assert_eq!(service.describe_count(), 1);
    assert!(delays.lock().unwrap().is_empty());
}
