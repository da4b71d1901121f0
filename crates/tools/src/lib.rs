//! Built-in tool implementations for AgentLoop.
//!
//! A customer-support tool set: find users, inspect an account, change a
//! subscription, and notify the customer. The tools simulate their backing
//! services with fixed data so runs are reproducible.

pub mod get_user_details;
pub mod notify_customer;
pub mod prompt;
pub mod search_users;
pub mod update_subscription;

use std::sync::Arc;

use agentloop_core::error::{RegistryError, ToolError};
use agentloop_core::tool::ToolRegistry;
use serde::de::DeserializeOwned;

pub use get_user_details::GetUserDetailsTool;
pub use notify_customer::NotifyCustomerTool;
pub use prompt::SYSTEM_PROMPT;
pub use search_users::SearchUsersTool;
pub use update_subscription::UpdateSubscriptionTool;

/// Create a registry with all built-in tools, in a fixed order.
pub fn default_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(NotifyCustomerTool))?;
    registry.register(Arc::new(SearchUsersTool))?;
    registry.register(Arc::new(GetUserDetailsTool))?;
    registry.register(Arc::new(UpdateSubscriptionTool))?;
    Ok(registry)
}

/// Deserialize tool arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(
    arguments: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
