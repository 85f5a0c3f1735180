//! Prompt assembly for the planning service

use super::models::{ChatMessage, ChatRole};
use crate::store::ProjectGraph;
use serde::Serialize;

pub const SYSTEM_PROMPT: &str = r#"You are a project planning assistant. The user's project is a directed acyclic graph of tasks: an edge from_task -> to_task means from_task must be done before to_task.

You receive the current graph as JSON and a request. Answer with a single JSON object and nothing else:

{
  "task_upserts": [{"id": <existing task id or a new string key>, "title": "...", "completed": false, "color": "..."}],
  "task_deletions": [<task id>],
  "dependency_upserts": [{"id": <existing dependency id, omit for new>, "from_task": <task id or new key>, "to_task": <task id or new key>}],
  "dependency_deletions": [<dependency id>],
  "summary": "one or two sentences describing the change",
  "requires_changes": true
}

Rules:
- New tasks use a short string key as id; dependencies may reference that key.
- Only include fields that change for existing tasks.
- Never create a dependency from a task to itself or one that closes a cycle.
- If the request is a question that needs no change, set requires_changes to false, leave every list empty and put the answer in summary."#;

#[derive(Serialize)]
struct SnapshotTask<'a> {
    id: i64,
    title: &'a str,
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
}

#[derive(Serialize)]
struct SnapshotDependency {
    id: i64,
    from_task: i64,
    to_task: i64,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    tasks: Vec<SnapshotTask<'a>>,
    dependencies: Vec<SnapshotDependency>,
}

/// Compact JSON view of the graph. Positions are left out; the planner does
/// not lay out nodes.
pub fn graph_snapshot(graph: &ProjectGraph) -> String {
    let snapshot = Snapshot {
        tasks: graph
            .tasks
            .iter()
            .map(|t| SnapshotTask {
                id: t.id,
                title: &t.title,
                completed: t.completed,
                color: t.color.as_deref(),
            })
            .collect(),
        dependencies: graph
            .dependencies
            .iter()
            .map(|d| SnapshotDependency {
                id: d.id,
                from_task: d.from_task,
                to_task: d.to_task,
            })
            .collect(),
    };
    serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string())
}

/// One message of the chat completions request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// System prompt, prior turns, then the request with the current graph
pub fn build_messages(
    graph: &ProjectGraph,
    history: &[ChatMessage],
    prompt: &str,
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::new("system", SYSTEM_PROMPT));
    for turn in history {
        let role = match turn.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        messages.push(PromptMessage::new(role, turn.content.clone()));
    }
    messages.push(PromptMessage::new(
        "user",
        format!(
            "Current graph:\n{}\n\nRequest:\n{}",
            graph_snapshot(graph),
            prompt.trim()
        ),
    ));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DependencyNode, TaskNode};
    use chrono::Utc;

    fn graph() -> ProjectGraph {
        let now = Utc::now();
        let task = |id: i64, title: &str, completed: bool| TaskNode {
            id,
            project_id: 1,
            title: title.to_string(),
            x: 10.0,
            y: 20.0,
            completed,
            color: None,
            locked: false,
            created_at: now,
            updated_at: now,
        };
        ProjectGraph {
            project_id: 1,
            tasks: vec![task(1, "Design", true), task(2, "Build", false)],
            dependencies: vec![DependencyNode {
                id: 5,
                project_id: 1,
                from_task: 1,
                to_task: 2,
            }],
        }
    }

    #[test]
    fn test_snapshot_omits_positions() {
        let json: serde_json::Value = serde_json::from_str(&graph_snapshot(&graph())).unwrap();
        assert_eq!(json["tasks"][0]["title"], "Design");
        assert!(json["tasks"][0].get("x").is_none());
        assert!(json["tasks"][0].get("color").is_none());
        assert_eq!(json["dependencies"][0]["from_task"], 1);
    }

    #[test]
    fn test_messages_keep_history_order() {
        let history = vec![
            ChatMessage {
                role: ChatRole::User,
                content: "Add a test phase".to_string(),
            },
            ChatMessage {
                role: ChatRole::Assistant,
                content: "Added QA after Build".to_string(),
            },
        ];
        let messages = build_messages(&graph(), &history, "  Now add docs  ");

        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        let last = &messages[3].content;
        assert!(last.contains("\"Build\""));
        assert!(last.ends_with("Request:\nNow add docs"));
    }
}
