//! Tools advertised to the model.
//!
//! A [`Tool`] is a named capability with a JSON-schema parameter description.
//! Tools are collected in an explicit [`ToolRegistry`] that the caller hands
//! to the client; there is no global registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{Error, Result};

/// A capability the model may call.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model refers to the tool by.
    fn name(&self) -> String;

    /// What the tool does, in words for the model.
    fn description(&self) -> String;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Runs the tool on parsed arguments.
    async fn execute(&self, arguments: Value) -> Result<Value>;
}

/// Named set of tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool of the same name.  Returns the
    /// replaced tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.name(), tool)
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in function-calling format.
    pub fn to_openai_format(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect()
    }

    /// Runs the named tool.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::tool(name, "no such tool"))?;
        tracing::debug!(tool = name, "executing tool");
        tool.execute(arguments).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list())
            .finish()
    }
}
