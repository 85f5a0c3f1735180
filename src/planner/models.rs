//! Plan proposal types exchanged with the planning service

use crate::store::TaskRef;
use serde::{Deserialize, Serialize};

/// Insert or update of one task.
///
/// `id` is either an existing task id or a key chosen by the planner for a
/// new task, which dependency upserts may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedTask {
    pub id: TaskRef,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

/// Insert of a new dependency, or re-pointing of an existing one when `id`
/// is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedDependency {
    #[serde(default)]
    pub id: Option<i64>,
    pub from_task: TaskRef,
    pub to_task: TaskRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanProposal {
    pub task_upserts: Vec<ProposedTask>,
    pub task_deletions: Vec<i64>,
    pub dependency_upserts: Vec<ProposedDependency>,
    pub dependency_deletions: Vec<i64>,
    pub summary: String,
    /// False when the request was a question that needs no graph change
    pub requires_changes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Body of `POST /api/projects/{id}/generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Response of the generate endpoint. Planner failures are reported inline
/// in `error` so the conversation can show them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<PlanProposal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_parses_mixed_task_refs() {
        let json = r#"{
            "task_upserts": [
                {"id": 4, "completed": true},
                {"id": "design", "title": "Design API"}
            ],
            "dependency_upserts": [{"from_task": "design", "to_task": 4}],
            "summary": "Adds a design step",
            "requires_changes": true
        }"#;
        let proposal: PlanProposal = serde_json::from_str(json).unwrap();
        assert_eq!(proposal.task_upserts[0].id, TaskRef::Id(4));
        assert_eq!(proposal.task_upserts[1].id, TaskRef::Temp("design".to_string()));
        assert_eq!(proposal.dependency_upserts[0].to_task, TaskRef::Id(4));
        assert!(proposal.task_deletions.is_empty());
        assert!(proposal.requires_changes);
    }

    #[test]
    fn test_generate_response_omits_empty_fields() {
        let json = serde_json::to_value(GenerateResponse {
            proposal: None,
            error: Some("planner unavailable".to_string()),
        })
        .unwrap();
        assert!(json.get("proposal").is_none());
        assert_eq!(json["error"], "planner unavailable");
    }
}
