//! Upgrade, downgrade, cancel or reactivate a plan.

use async_trait::async_trait;
use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolContext, ToolResult};
use serde::Deserialize;
use tracing::info;

use crate::parse_args;

pub struct UpdateSubscriptionTool;

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    user_id: String,
    action: Action,
    #[serde(default)]
    new_plan: Option<Plan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Upgrade,
    Downgrade,
    Cancel,
    Reactivate,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
            Self::Cancel => "cancel",
            Self::Reactivate => "reactivate",
        }
    }

    fn needs_plan(self) -> bool {
        matches!(self, Self::Upgrade | Self::Downgrade)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

#[async_trait]
impl Tool for UpdateSubscriptionTool {
    fn name(&self) -> &str {
        "update_subscription"
    }

    fn description(&self) -> &str {
        "Update a user's subscription plan or status"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "The user's unique identifier"
                },
                "action": {
                    "type": "string",
                    "enum": ["upgrade", "downgrade", "cancel", "reactivate"],
                    "description": "The subscription action to perform"
                },
                "new_plan": {
                    "type": "string",
                    "enum": ["free", "pro", "enterprise"],
                    "description": "The new subscription plan (required for upgrade/downgrade)"
                }
            },
            "required": ["user_id", "action"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: UpdateArgs = parse_args(arguments)?;

        if args.action.needs_plan() && args.new_plan.is_none() {
            return Ok(ToolResult::failure(
                format!(
                    "Failed to update subscription: {} requires new_plan",
                    args.action.as_str()
                ),
                "missing new_plan",
            ));
        }

        let action = args.action.as_str();
        let plan = args.new_plan.map(Plan::as_str);
        info!(user_id = %args.user_id, action, plan, "Updating subscription");

        let mut message = format!("Successfully performed {action} for user {}", args.user_id);
        if let Some(plan) = plan {
            message.push_str(&format!(" to {plan} plan"));
        }

        Ok(ToolResult::ok_with_data(
            message,
            serde_json::json!({
                "user_id": args.user_id,
                "action": action,
                "new_plan": plan,
                "effective_date": "2024-01-15T10:30:00Z",
            }),
        ))
    }
}
