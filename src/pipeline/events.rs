use appforge_common::{ArtifactType, CheckStatus, RunStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::Stage;
use crate::gates::GateStatus;

/// Progress events emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        project_name: String,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        duration_ms: u64,
    },
    ArtifactStored {
        artifact_type: ArtifactType,
        version: u32,
        created_by: String,
    },
    VerificationCompleted {
        status: CheckStatus,
        passed: usize,
        failed: usize,
        skipped: usize,
    },
    GateEvaluated {
        status: GateStatus,
        blocking: usize,
    },
    /// A repair attempt is starting.
    RepairAttempt {
        attempt: u32,
        max_attempts: u32,
    },
    /// A repair attempt ended without a passing gate.
    RepairAttemptFailed {
        attempt: u32,
        reason: String,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

pub type EventSender = mpsc::Sender<PipelineEvent>;

/// Send `event` if a channel is attached. A closed receiver is ignored.
pub(crate) async fn emit(tx: &Option<EventSender>, event: PipelineEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag() {
        let event = PipelineEvent::StageStarted {
            stage: Stage::MobileSpec,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage_started");
        assert_eq!(json["stage"], "mobile_spec");
    }

    #[tokio::test]
    async fn test_emit_without_channel_is_noop() {
        emit(&None, PipelineEvent::StageStarted { stage: Stage::Prd }).await;
    }

    #[tokio::test]
    async fn test_emit_ignores_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        emit(&Some(tx), PipelineEvent::StageStarted { stage: Stage::Prd }).await;
    }
}
