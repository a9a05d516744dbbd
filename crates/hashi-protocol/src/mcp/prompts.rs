//! MCP prompts/* method types.

use serde::{Deserialize, Serialize};

/// A single prompt definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Prompt name.
    pub name: String,
    /// Prompt description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Response for `prompts/list`.
///
/// The endpoint exposes no prompts; clients still require the `prompts`
/// field to be a JSON array, never `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsListResult {
    /// Available prompts.
    pub prompts: Vec<PromptDefinition>,
}
