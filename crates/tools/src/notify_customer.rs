//! Sends an email, SMS or push notification.

use async_trait::async_trait;
use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolContext, ToolResult};
use serde::Deserialize;
use tracing::info;

use crate::parse_args;

pub struct NotifyCustomerTool;

#[derive(Debug, Deserialize)]
struct NotifyArgs {
    user_id: String,
    message: String,
    notification_type: NotificationType,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NotificationType {
    Email,
    Sms,
    Push,
}

impl NotificationType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        }
    }
}

#[async_trait]
impl Tool for NotifyCustomerTool {
    fn name(&self) -> &str {
        "notify_customer"
    }

    fn description(&self) -> &str {
        "Send a notification to a customer about their account or service"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string", "description": "The customer's user ID" },
                "message": {
                    "type": "string",
                    "description": "The notification message to send"
                },
                "notification_type": {
                    "type": "string",
                    "enum": ["email", "sms", "push"],
                    "description": "Type of notification to send"
                }
            },
            "required": ["user_id", "message", "notification_type"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: NotifyArgs = parse_args(arguments)?;
        if args.message.trim().is_empty() {
            return Ok(ToolResult::failure(
                "Failed to send notification: message is empty",
                "empty message",
            ));
        }

        let channel = args.notification_type.as_str();
        info!(user_id = %args.user_id, channel, "Sending customer notification");

        Ok(ToolResult::ok_with_data(
            format!(
                "Successfully sent {channel} notification to user {}",
                args.user_id
            ),
            serde_json::json!({
                "user_id": args.user_id,
                "notification_type": channel,
                "sent_at": "2024-01-15T10:30:00Z",
            }),
        ))
    }
}
