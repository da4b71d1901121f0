//! Finds users by email, subscription status or account type.

use async_trait::async_trait;
use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolContext, ToolResult};
use serde::Deserialize;

use crate::parse_args;

pub struct SearchUsersTool;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    subscription_status: Option<String>,
    #[serde(default)]
    account_type: Option<String>,
}

const SUBSCRIPTION_STATUSES: &[&str] = &["active", "cancelled", "expired", "trial"];
const ACCOUNT_TYPES: &[&str] = &["free", "pro", "enterprise"];

#[async_trait]
impl Tool for SearchUsersTool {
    fn name(&self) -> &str {
        "search_users"
    }

    fn description(&self) -> &str {
        "Search for users using business-relevant criteria like subscription status or account type"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email": { "type": "string", "description": "Search by email address" },
                "subscription_status": {
                    "type": "string",
                    "enum": SUBSCRIPTION_STATUSES,
                    "description": "Filter by subscription status"
                },
                "account_type": {
                    "type": "string",
                    "enum": ACCOUNT_TYPES,
                    "description": "Filter by account type"
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: SearchArgs = parse_args(arguments)?;

        if let Some(status) = args.subscription_status.as_deref()
            && !SUBSCRIPTION_STATUSES.contains(&status)
        {
            return Err(ToolError::InvalidArguments(format!(
                "unknown subscription_status '{status}'"
            )));
        }
        if let Some(kind) = args.account_type.as_deref()
            && !ACCOUNT_TYPES.contains(&kind)
        {
            return Err(ToolError::InvalidArguments(format!(
                "unknown account_type '{kind}'"
            )));
        }

        let users = vec![serde_json::json!({
            "user_id": "user_123",
            "email": args.email.as_deref().unwrap_or("john@example.com"),
            "subscription_status": args.subscription_status.as_deref().unwrap_or("active"),
            "account_type": args.account_type.as_deref().unwrap_or("pro"),
        })];
        let total = users.len();

        Ok(ToolResult::ok_with_data(
            format!("Found {total} user(s) matching criteria"),
            serde_json::json!({ "users": users, "total_count": total }),
        ))
    }
}
