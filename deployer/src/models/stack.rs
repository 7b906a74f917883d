//! Stack and running instance models

use serde::{Deserialize, Serialize};

/// Capabilities the provisioning service recognizes
pub const KNOWN_CAPABILITIES: [&str; 3] = [
    "CAPABILITY_IAM",
    "CAPABILITY_NAMED_IAM",
    "CAPABILITY_AUTO_EXPAND",
];

/// Stack status as reported by the provisioning service
///
/// The service owns this state; the pipeline only observes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackState {
    NotFound,
    CreateInProgress,
    CreateComplete,
    UpdateInProgress,
    UpdateComplete,
    /// Any `ROLLBACK_*` or `UPDATE_ROLLBACK_*` status, raw
    Rollback(String),
    DeleteInProgress,
    /// Any `*_FAILED` status outside of a rollback, raw
    Failed(String),
}

impl StackState {
    /// Map a raw service status string onto a state
    pub fn from_status(status: &str) -> Self {
        match status {
            "CREATE_IN_PROGRESS" | "REVIEW_IN_PROGRESS" => StackState::CreateInProgress,
            "CREATE_COMPLETE" => StackState::CreateComplete,
            "UPDATE_IN_PROGRESS"
            | "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"
            | "IMPORT_IN_PROGRESS" => StackState::UpdateInProgress,
            "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => StackState::UpdateComplete,
            "DELETE_IN_PROGRESS" => StackState::DeleteInProgress,
            "DELETE_COMPLETE" => StackState::NotFound,
            s if s.contains("ROLLBACK") => StackState::Rollback(s.to_string()),
            s => StackState::Failed(s.to_string()),
        }
    }

    /// No further transition happens without a new request
    pub fn is_terminal(&self) -> bool {
        match self {
            StackState::NotFound
            | StackState::CreateComplete
            | StackState::UpdateComplete
            | StackState::Failed(_) => true,
            StackState::Rollback(raw) => raw.ends_with("_COMPLETE") || raw.ends_with("_FAILED"),
            StackState::CreateInProgress
            | StackState::UpdateInProgress
            | StackState::DeleteInProgress => false,
        }
    }

    /// The stack converged to what was requested
    pub fn is_success(&self) -> bool {
        matches!(self, StackState::CreateComplete | StackState::UpdateComplete)
    }
}

impl std::fmt::Display for StackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackState::NotFound => f.write_str("NOT_FOUND"),
            StackState::CreateInProgress => f.write_str("CREATE_IN_PROGRESS"),
            StackState::CreateComplete => f.write_str("CREATE_COMPLETE"),
            StackState::UpdateInProgress => f.write_str("UPDATE_IN_PROGRESS"),
            StackState::UpdateComplete => f.write_str("UPDATE_COMPLETE"),
            StackState::DeleteInProgress => f.write_str("DELETE_IN_PROGRESS"),
            StackState::Rollback(raw) | StackState::Failed(raw) => f.write_str(raw),
        }
    }
}

/// Result of submitting a stack request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitOutcome {
    Created,
    Updated,
    /// The template and parameters match what is already deployed
    Unchanged,
}

/// Response of the service to an update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResponse {
    Submitted,
    NoChanges,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Submitted,
    NotFound,
}

/// A running task of the deployed stack, resolved on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningInstance {
    pub task_identifier: String,
    pub network_interface_identifier: String,
    pub public_address: String,
}
