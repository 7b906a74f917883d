//! Bounded stack status polling

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::stack::StackState;
use crate::services::OrchestrationService;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Poll policy
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Backoff between status queries
    pub cooldown: CooldownOptions,

    /// Status queries before giving up
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            cooldown: CooldownOptions::default(),
            max_attempts: 40,
        }
    }
}

/// What the poll observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// The stack reached a terminal state
    Settled(StackState),

    /// Attempts ran out before the stack settled
    StillInProgress { last: StackState, attempts: u32 },
}

/// Poll a stack until it settles or the attempts are exhausted
///
/// Never waits unbounded: at most `max_attempts` queries are made, with
/// `sleep_fn` called between them.
pub async fn wait_for_stack<S, F>(
    service: &dyn OrchestrationService,
    stack_name: &str,
    region: &str,
    policy: &PollPolicy,
    sleep_fn: S,
) -> Result<PollOutcome, DeployError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = StackState::NotFound;

    for attempt in 0..attempts {
        last = service.describe_stack(stack_name, region).await?;
        if last.is_terminal() {
            info!("Stack {} settled in {}", stack_name, last);
            return Ok(PollOutcome::Settled(last));
        }

        if attempt + 1 < attempts {
            let delay = calc_exp_backoff(&policy.cooldown, attempt);
            debug!(
                "Stack {} is {} (attempt {}/{}), next check in {:?}",
                stack_name,
                last,
                attempt + 1,
                attempts,
                delay
            );
            sleep_fn(delay).await;
        }
    }

    info!(
        "Stack {} still {} after {} checks",
        stack_name, last, attempts
    );
    Ok(PollOutcome::StillInProgress { last, attempts })
}
