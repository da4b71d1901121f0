//! Turn and Transcript domain types.
//!
//! These are the value objects that flow through a run:
//! the caller's message seeds a transcript, the provider appends assistant
//! turns, and tool executions append tool-result turns.
//!
//! Turns carry no ids or timestamps, so identical inputs to a deterministic
//! provider and tool set produce identical transcripts.

use serde::{Deserialize, Serialize};

use crate::tool::ToolResult;

/// The role of a turn in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call identifier, unique within the run
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A single entry in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,

    /// Text content. `None` for assistant turns that only request tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant, in provider order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, which call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// The structured result behind a tool-result turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Turn {
    fn bare(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_result: None,
        }
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::bare(Role::System, Some(content.into()))
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, Some(content.into()))
    }

    /// Create a plain assistant turn (a final answer).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant turn that requests tool calls.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::bare(Role::Assistant, content)
        }
    }

    /// Create a tool-result turn answering `call_id`.
    ///
    /// The content is the JSON rendering of the result, which is what
    /// providers see.
    pub fn tool_result(call_id: impl Into<String>, result: ToolResult) -> Self {
        let content =
            serde_json::to_string(&result).unwrap_or_else(|_| result.message.clone());
        Self {
            tool_call_id: Some(call_id.into()),
            tool_result: Some(result),
            ..Self::bare(Role::Tool, Some(content))
        }
    }

    /// Text content, or the empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// The ordered, append-only sequence of turns of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The most recent assistant turn, if any.
    pub fn last_assistant(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }

    /// Tool calls of the most recent assistant turn that have no result yet.
    pub fn unanswered_calls(&self) -> Vec<&ToolCallRequest> {
        let Some(pos) = self.turns.iter().rposition(|t| t.role == Role::Assistant) else {
            return Vec::new();
        };
        let answered: Vec<&str> = self.turns[pos + 1..]
            .iter()
            .filter_map(|t| t.tool_call_id.as_deref())
            .collect();
        self.turns[pos]
            .tool_calls
            .iter()
            .filter(|c| !answered.contains(&c.id.as_str()))
            .collect()
    }

    /// Rough token estimate (4 chars per token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.text().len() / 4).sum()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}
