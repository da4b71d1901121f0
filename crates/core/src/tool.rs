//! Tool trait, the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! look up users, send notifications, change subscriptions, etc.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, ToolError};
use crate::provider::ToolSchema;

/// The result of a tool execution.
///
/// Never mutated after creation; the turn that carries it owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Human/machine-readable summary
    pub message: String,

    /// Optional structured data
    #[serde(default)]
    pub data: Option<serde_json::Value>,

    /// Error detail for failed results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(message)
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Per-invocation context handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The call this invocation answers
    pub call_id: String,

    /// Fired when the run is cancelled. Long-running tools should watch it.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(call_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            call_id: call_id.into(),
            cancel,
        }
    }

    /// A context that is never cancelled.
    pub fn detached(call_id: impl Into<String>) -> Self {
        Self::new(call_id, CancellationToken::new())
    }
}

/// The core Tool trait.
///
/// Each tool implements this trait independently. Tools are registered in the
/// ToolRegistry and made available to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search_users").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM verbatim).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolSchema for sending to the LLM.
    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Built once, then shared read-only (behind an `Arc`) by every run.
/// The agent loop uses it to:
/// 1. Get tool schemas to send to the LLM
/// 2. Look up tools when the LLM requests them
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: Arc<dyn Tool>) -> std::result::Result<Self, RegistryError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> std::result::Result<Arc<dyn Tool>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All tool schemas, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.to_schema()).collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Check that `arguments` structurally conform to a JSON Schema object.
///
/// Only the shape is checked: the payload must be an object when the schema
/// says so, every `required` key must be present, and properties with a
/// primitive `type` must carry a value of that type. `enum` membership and
/// other semantic constraints are left to the tool.
pub fn check_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> std::result::Result<(), ToolError> {
    if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Ok(());
    }

    let Some(args) = arguments.as_object() else {
        return Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {}",
            json_type_name(arguments)
        )));
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if args.get(key).is_none_or(|v| v.is_null()) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument '{key}'"
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in args {
            // Explicit nulls are treated like absent optional arguments.
            if value.is_null() {
                continue;
            }
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !matches_type(expected, value) {
                return Err(ToolError::InvalidArguments(format!(
                    "argument '{key}' should be {expected}, got {}",
                    json_type_name(value)
                )));
            }
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
