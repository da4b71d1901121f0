//! User details tool: account status, plan and billing for one user.

use async_trait::async_trait;
use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolContext, ToolResult};
use serde::Deserialize;

use crate::parse_args;

pub struct GetUserDetailsTool;

#[derive(Debug, Deserialize)]
struct DetailsArgs {
    user_id: String,
}

#[async_trait]
impl Tool for GetUserDetailsTool {
    fn name(&self) -> &str {
        "get_user_details"
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific user including account status and history"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "The user's unique identifier"
                }
            },
            "required": ["user_id"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: DetailsArgs = parse_args(arguments)?;
        let user_id = args.user_id.trim();
        if user_id.is_empty() {
            return Err(ToolError::InvalidArguments("user_id must not be empty".into()));
        }

        let user = serde_json::json!({
            "user_id": user_id,
            "email": "john@example.com",
            "name": "John Doe",
            "subscription_status": "active",
            "account_type": "pro",
            "created_at": "2023-01-15T10:30:00Z",
            "last_login": "2024-01-14T15:45:00Z",
            "billing_info": {
                "next_billing_date": "2024-02-15T00:00:00Z",
                "amount": "$29.99",
            },
        });

        Ok(ToolResult::ok_with_data(
            format!("Retrieved details for user {user_id}"),
            serde_json::json!({ "user": user }),
        ))
    }
}
