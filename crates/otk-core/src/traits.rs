use super::{Result, ToolContext};
use async_trait::async_trait;
use std::sync::Arc;

/// Tool trait - abstraction for callable tools
///
/// Consumers render [`Tool::schema`] in whatever input layer they own
/// (CLI flags, a model's function-calling schema, ...) and call
/// [`Tool::execute`] with a raw JSON parameter object. Validation happens
/// inside the tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the name of the tool
    fn name(&self) -> &str;

    /// Returns a description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's parameters
    fn schema(&self) -> serde_json::Value;

    /// Executes the tool with given parameters
    async fn execute(
        &self,
        ctx: Arc<dyn ToolContext>,
        params: serde_json::Value,
    ) -> Result<ToolResponse>;
}

/// A named collection of tools handed to a consumer once per session.
pub trait Toolset: Send + Sync {
    /// Returns every tool in the set, in definition order
    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    /// Looks up a tool by name. The first tool with a matching name wins.
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools().into_iter().find(|t| t.name() == name)
    }
}

/// Tool execution response
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub result: serde_json::Value,
}
