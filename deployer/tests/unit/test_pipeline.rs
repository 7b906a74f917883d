//! Pipeline workflow tests

use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use deployctl::deploy::fsm::{Step, Workflow};
use deployctl::deploy::pipeline::{ProvisionRequest, PublishRequest, SmokeTestRequest};
use deployctl::deploy::poller::{PollOutcome, PollPolicy};
use deployctl::errors::ErrorKind;
use deployctl::models::image::BuildSpec;
use deployctl::models::stack::{StackState, SubmitOutcome};
use deployctl::utils::calc_exp_backoff;

use crate::support::{
    complete_parameters, fast_cooldown, recording_sleep, StubEngine, StubOrchestration,
    StubRegistry, Stubs,
};

fn publish_request() -> PublishRequest {
    PublishRequest {
        build: BuildSpec::new("app", std::env::temp_dir(), "v1"),
        repository: "app".to_string(),
        tag: "v1".to_string(),
        region: "us-west-2".to_string(),
    }
}

fn provision_request(wait: bool, cluster: Option<&str>) -> ProvisionRequest {
    ProvisionRequest {
        stack_name: "app-stack".to_string(),
        template: "Resources: {}".to_string(),
        parameters: complete_parameters(),
        capabilities: vec!["CAPABILITY_NAMED_IAM".to_string()],
        region: "us-west-2".to_string(),
        wait: wait.then(|| PollPolicy {
            cooldown: fast_cooldown(),
            max_attempts: 5,
        }),
        cluster: cluster.map(str::to_string),
    }
}

#[tokio::test]
async fn test_build_and_publish() {
    let stubs = Stubs::default();

    let report = assert_ok!(stubs.pipeline().build_and_publish(&publish_request()).await);

    assert_eq!(report.local_image, "app:v1");
    assert_eq!(
        report.remote_reference,
        "123456789012.dkr.ecr.us-west-2.amazonaws.com/app:v1"
    );
    assert!(report.repository_created);
    assert_eq!(
        report.steps,
        vec![
            Step::Build,
            Step::ResolveIdentity,
            Step::EnsureRepository,
            Step::Authenticate,
            Step::Publish,
        ]
    );
    assert_eq!(
        stubs.engine.calls(),
        vec![
            "build app:v1",
            "login 123456789012.dkr.ecr.us-west-2.amazonaws.com AWS",
            "tag app:v1 123456789012.dkr.ecr.us-west-2.amazonaws.com/app:v1",
            "push 123456789012.dkr.ecr.us-west-2.amazonaws.com/app:v1",
        ]
    );
}

#[tokio::test]
async fn test_republish_reuses_repository() {
    let stubs = Stubs::new(
        StubEngine::default(),
        StubRegistry::with_repository("app"),
        StubOrchestration::default(),
    );

    let report = assert_ok!(stubs.pipeline().build_and_publish(&publish_request()).await);

    assert!(!report.repository_created);
    assert!(!stubs
        .registry
        .calls()
        .iter()
        .any(|c| c.starts_with("create")));
}

#[tokio::test]
async fn test_build_failure_halts_publish() {
    let stubs = Stubs::new(
        StubEngine {
            fail_build: true,
            ..Default::default()
        },
        StubRegistry::default(),
        StubOrchestration::default(),
    );

    let failure = assert_err!(stubs.pipeline().build_and_publish(&publish_request()).await);

    assert_eq!(failure.workflow, Workflow::BuildAndPublish);
    assert_eq!(failure.step, Step::Build);
    assert_eq!(failure.kind(), ErrorKind::BuildError);
    assert_eq!(failure.last_completed(), None);
    assert_eq!(stubs.identity.calls(), 0);
    assert!(stubs.registry.calls().is_empty());
    assert_eq!(stubs.engine.calls(), vec!["build app:v1"]);
}

#[tokio::test]
async fn test_auth_failure_reports_completed_steps() {
    let stubs = Stubs::new(
        StubEngine {
            fail_login: true,
            ..Default::default()
        },
        StubRegistry::default(),
        StubOrchestration::default(),
    );

    let failure = assert_err!(stubs.pipeline().build_and_publish(&publish_request()).await);

    assert_eq!(failure.step, Step::Authenticate);
    assert_eq!(failure.kind(), ErrorKind::AuthError);
    assert_eq!(failure.last_completed(), Some(Step::EnsureRepository));
    // the repository created before the failure stays
    assert_eq!(*stubs.registry.repositories.lock().unwrap(), vec!["app"]);
    assert!(!stubs.engine.calls().iter().any(|c| c.starts_with("push")));
}

#[tokio::test]
async fn test_invalid_destination_fails_before_build() {
    for (repository, tag) in [("-app", "v1"), ("app", " ")] {
        let stubs = Stubs::default();
        let request = PublishRequest {
            repository: repository.to_string(),
            tag: tag.to_string(),
            ..publish_request()
        };

        let failure = assert_err!(stubs.pipeline().build_and_publish(&request).await);

        assert_eq!(failure.step, Step::Build);
        assert_eq!(failure.kind(), ErrorKind::ValidationError);
        assert!(failure.completed.is_empty());
        assert!(stubs.engine.calls().is_empty());
        assert_eq!(stubs.identity.calls(), 0);
        assert!(stubs.registry.calls().is_empty());
    }
}

#[tokio::test]
async fn test_publish_backs_off_between_push_attempts() {
    let stubs = Stubs::new(
        StubEngine {
            push_failures: AtomicU32::new(1),
            ..Default::default()
        },
        StubRegistry::default(),
        StubOrchestration::default(),
    );
    let delays = Arc::new(Mutex::new(Vec::new()));

    let report = assert_ok!(
        stubs
            .pipeline()
            .build_and_publish_with(&publish_request(), recording_sleep(delays.clone()))
            .await
    );

    assert_eq!(report.steps.last(), Some(&Step::Publish));
    assert_eq!(
        *delays.lock().unwrap(),
        vec![calc_exp_backoff(&fast_cooldown(), 0)]
    );
}

#[tokio::test]
async fn test_local_smoke_test() {
    let stubs = Stubs::default();
    let request = SmokeTestRequest {
        build: BuildSpec::new("app", std::env::temp_dir(), "latest"),
        container_name: "app-local".to_string(),
        port: 8080,
        env: vec![("AWS_DEFAULT_REGION".to_string(), "us-west-2".to_string())],
        verify: None,
    };

    let report = assert_ok!(stubs.pipeline().local_smoke_test(&request).await);

    assert_eq!(report.image, "app:latest");
    assert_eq!(report.container_id, "app-local-id");
    assert_eq!(report.url, "http://localhost:8080");
    assert_eq!(report.http_status, None);
    assert_eq!(report.steps, vec![Step::Build, Step::RunLocal]);
}

#[tokio::test]
async fn test_provision_without_wait() {
    let stubs = Stubs::default();

    let report = assert_ok!(
        stubs
            .pipeline()
            .provision(&provision_request(false, Some("app-cluster")))
            .await
    );

    assert_eq!(report.submitted, SubmitOutcome::Created);
    assert!(report.poll.is_none());
    assert!(report.endpoint.is_none());
    assert_eq!(report.steps, vec![Step::Deploy]);
    assert_eq!(stubs.orchestration.describe_count(), 1);
}

#[tokio::test]
async fn test_provision_waits_and_resolves_endpoint() {
    let stubs = Stubs::new(
        StubEngine::default(),
        StubRegistry::default(),
        StubOrchestration {
            tasks: vec!["task-1".to_string()],
            interface: Some("eni-0abc".to_string()),
            public_ip: Some("203.0.113.5".to_string()),
            ..StubOrchestration::with_states(&[
                StackState::NotFound,
                StackState::CreateInProgress,
                StackState::CreateComplete,
            ])
        },
    );
    let delays = Arc::new(Mutex::new(Vec::new()));

    let report = assert_ok!(
        stubs
            .pipeline()
            .provision_with(
                &provision_request(true, Some("app-cluster")),
                recording_sleep(delays.clone()),
            )
            .await
    );

    assert_eq!(report.submitted, SubmitOutcome::Created);
    assert_eq!(
        report.poll,
        Some(PollOutcome::Settled(StackState::CreateComplete))
    );
    assert_eq!(
        report.endpoint.map(|e| e.public_address).as_deref(),
        Some("203.0.113.5")
    );
    assert_eq!(
        report.steps,
        vec![Step::Deploy, Step::Poll, Step::ResolveEndpoint]
    );
    assert_eq!(delays.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_provision_rollback_is_provision_failed() {
    let stubs = Stubs::new(
        StubEngine::default(),
        StubRegistry::default(),
        StubOrchestration::with_states(&[
            StackState::NotFound,
            StackState::Rollback("ROLLBACK_COMPLETE".to_string()),
        ]),
    );
    let delays = Arc::new(Mutex::new(Vec::new()));

    let failure = assert_err!(
        stubs
            .pipeline()
            .provision_with(
                &provision_request(true, Some("app-cluster")),
                recording_sleep(delays),
            )
            .await
    );

    assert_eq!(failure.step, Step::Poll);
    assert_eq!(failure.kind(), ErrorKind::ProvisionFailed);
    assert_eq!(failure.completed, vec![Step::Deploy]);
    assert!(!stubs
        .orchestration
        .calls()
        .iter()
        .any(|c| c.starts_with("list_tasks")));
}

#[tokio::test]
async fn test_provision_timeout_is_not_an_error() {
    let stubs = Stubs::new(
        StubEngine::default(),
        StubRegistry::default(),
        StubOrchestration::with_states(&[StackState::CreateComplete, StackState::UpdateInProgress]),
    );
    let delays = Arc::new(Mutex::new(Vec::new()));

    let report = assert_ok!(
        stubs
            .pipeline()
            .provision_with(
                &provision_request(true, Some("app-cluster")),
                recording_sleep(delays.clone()),
            )
            .await
    );

    assert_eq!(report.submitted, SubmitOutcome::Updated);
    assert_eq!(
        report.poll,
        Some(PollOutcome::StillInProgress {
            last: StackState::UpdateInProgress,
            attempts: 5,
        })
    );
    assert!(report.endpoint.is_none());
    assert_eq!(delays.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_provision_validation_failure_makes_no_calls() {
    let stubs = Stubs::default();
    let mut request = provision_request(true, None);
    request.parameters = complete_parameters().with("S3BucketName", "");

    let failure = assert_err!(stubs.pipeline().provision(&request).await);

    assert_eq!(failure.step, Step::Deploy);
    assert_eq!(failure.kind(), ErrorKind::ValidationError);
    assert!(failure.completed.is_empty());
    assert!(stubs.orchestration.calls().is_empty());
}

#[tokio::test]
async fn test_endpoint_failure_after_settled_stack() {
    let stubs = Stubs::new(
        StubEngine::default(),
        StubRegistry::default(),
        StubOrchestration::with_states(&[StackState::NotFound, StackState::CreateComplete]),
    );
    let delays = Arc::new(Mutex::new(Vec::new()));

    let failure = assert_err!(
        stubs
            .pipeline()
            .provision_with(
                &provision_request(true, Some("app-cluster")),
                recording_sleep(delays),
            )
            .await
    );

    assert_eq!(failure.step, Step::ResolveEndpoint);
    assert_eq!(failure.kind(), ErrorKind::NotFoundError);
    assert_eq!(failure.last_completed(), Some(Step::Poll));
}

#[tokio::test]
async fn test_poll_delays_come_from_policy() {
    let stubs = Stubs::new(
        StubEngine::default(),
        StubRegistry::default(),
        StubOrchestration::with_states(&[
            StackState::NotFound,
            StackState::CreateInProgress,
            StackState::CreateInProgress,
            StackState::CreateComplete,
        ]),
    );
    let delays = Arc::new(Mutex::new(Vec::new()));

    assert_ok!(
        stubs
            .pipeline()
            .provision_with(&provision_request(true, None), recording_sleep(delays.clone()))
            .await
    );

    assert_eq!(
        *delays.lock().unwrap(),
        vec![Duration::from_millis(1), Duration::from_millis(2)]
    );
}
