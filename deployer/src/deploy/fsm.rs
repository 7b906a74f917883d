//! Finite State Machine for workflow progress

use serde::{Deserialize, Serialize};

/// Pipeline workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workflow {
    LocalSmokeTest,
    BuildAndPublish,
    Provision,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::LocalSmokeTest => "local-smoke-test",
            Workflow::BuildAndPublish => "build-and-publish",
            Workflow::Provision => "provision",
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Build,
    RunLocal,
    Verify,
    ResolveIdentity,
    EnsureRepository,
    Authenticate,
    Publish,
    Deploy,
    Poll,
    ResolveEndpoint,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Build => "build",
            Step::RunLocal => "run_local",
            Step::Verify => "verify",
            Step::ResolveIdentity => "resolve_identity",
            Step::EnsureRepository => "ensure_repository",
            Step::Authenticate => "authenticate",
            Step::Publish => "publish",
            Step::Deploy => "deploy",
            Step::Poll => "poll",
            Step::ResolveEndpoint => "resolve_endpoint",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Between steps (or before the first one)
    Idle,

    /// A step is executing
    InStep(Step),

    /// Every step succeeded
    Completed,

    /// A step failed; no further steps run
    Failed(Step),
}

/// Workflow event
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Start a step
    Begin(Step),

    /// The current step succeeded
    StepSucceeded,

    /// The current step failed
    StepFailed(String),

    /// No more steps
    Finish,
}

/// Workflow FSM
#[derive(Debug, Clone)]
pub struct WorkflowFsm {
    state: RunState,
    completed: Vec<Step>,
    error: Option<String>,
}

impl WorkflowFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            completed: Vec::new(),
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Steps that succeeded, in order
    pub fn completed(&self) -> &[Step] {
        &self.completed
    }

    pub fn last_completed(&self) -> Option<Step> {
        self.completed.last().copied()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (RunState::Idle, RunEvent::Begin(step)) => RunState::InStep(*step),
            (RunState::Idle, RunEvent::Finish) => RunState::Completed,

            (RunState::InStep(step), RunEvent::StepSucceeded) => {
                self.completed.push(*step);
                RunState::Idle
            }
            (RunState::InStep(step), RunEvent::StepFailed(err)) => {
                self.error = Some(err.clone());
                RunState::Failed(*step)
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for WorkflowFsm {
    fn default() -> Self {
        Self::new()
    }
}
