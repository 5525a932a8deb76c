//! Per-target delivery outcomes and the task-level report.

use uuid::Uuid;

use herald_common::error::AddonError;

use crate::Addon;

/// Terminal result for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Deliberately not sent, e.g. a chat room on the public default host.
    Skipped(String),
    /// Recorded and not retried: malformed target, bad config, expected 4xx.
    Rejected(String),
    /// Network-level failure for this target only.
    TransportError(String),
    /// Unexpected response that the scheduler should see.
    Failed { status: u16, body: String },
}

impl DeliveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Skipped(_) => "skipped",
            DeliveryOutcome::Rejected(_) => "rejected",
            DeliveryOutcome::TransportError(_) => "transport_error",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            DeliveryOutcome::Delivered => None,
            DeliveryOutcome::Skipped(reason)
            | DeliveryOutcome::Rejected(reason)
            | DeliveryOutcome::TransportError(reason) => Some(reason.clone()),
            DeliveryOutcome::Failed { status, body } => {
                Some(format!("response_status={status} body={body}"))
            }
        }
    }
}

impl From<AddonError> for DeliveryOutcome {
    fn from(err: AddonError) -> Self {
        match err {
            AddonError::Transport(detail) => DeliveryOutcome::TransportError(detail),
            AddonError::UnexpectedResponse { status, body, .. } => {
                DeliveryOutcome::Failed { status, body }
            }
            other => DeliveryOutcome::Rejected(other.to_string()),
        }
    }
}

/// Outcome of one target, identified by its log-safe rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub target: String,
    pub outcome: DeliveryOutcome,
}

/// Everything a delivery task did, in target order.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub addon: Addon,
    pub outcomes: Vec<TargetOutcome>,
}

impl TaskReport {
    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.label() == label)
            .count()
    }

    /// True when no target needs the scheduler's attention.
    pub fn is_success(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| matches!(o.outcome, DeliveryOutcome::Failed { .. }))
    }

    /// Surface the first unexpected response as an error for the retry layer.
    pub fn into_result(self) -> Result<Self, AddonError> {
        let failed = self.outcomes.iter().find_map(|o| match &o.outcome {
            DeliveryOutcome::Failed { status, body } => Some((*status, body.clone())),
            _ => None,
        });

        match failed {
            Some((status, body)) => Err(AddonError::UnexpectedResponse {
                addon: self.addon.name().to_string(),
                status,
                body,
            }),
            None => Ok(self),
        }
    }
}
