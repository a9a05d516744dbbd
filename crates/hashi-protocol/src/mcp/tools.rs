//! MCP tools/* method types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single tool definition in the MCP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Response for `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// Available tools.
    pub tools: Vec<ToolDefinition>,
}

/// Request params for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallParams {
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments to pass.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text { text: String },
    /// Image content (base64).
    Image { data: String, mime_type: String },
}

/// Response for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallResult {
    /// Content items returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_definition_serde_roundtrip() {
        let def = ToolDefinition {
            name: "openDiff".into(),
            description: Some("Open a diff view".into()),
            input_schema: json!({"type": "object"}),
        };
        let s = serde_json::to_string(&def).expect("ser");
        assert!(s.contains("inputSchema"));
        let back: ToolDefinition = serde_json::from_str(&s).expect("de");
        assert_eq!(back.name, "openDiff");
    }

    #[test]
    fn tools_list_result_empty_serializes_as_array() {
        let res = ToolsListResult { tools: vec![] };
        let json = serde_json::to_value(&res).expect("ser");
        assert!(json["tools"].is_array());
        assert_eq!(json["tools"].as_array().expect("arr").len(), 0);
    }

    #[test]
    fn tools_call_params_default_arguments() {
        let j = r#"{"name":"confirm"}"#;
        let p: ToolsCallParams = serde_json::from_str(j).expect("de");
        assert_eq!(p.name, "confirm");
        assert!(p.arguments.is_null());
    }

    #[test]
    fn tool_content_text_variant() {
        let c = ToolContent::Text {
            text: "done".into(),
        };
        let s = serde_json::to_string(&c).expect("ser");
        assert!(s.contains("\"type\":\"text\""));
    }

    #[test]
    fn tools_call_result_roundtrip() {
        let r = ToolsCallResult {
            content: vec![ToolContent::Text { text: "ok".into() }],
            is_error: false,
        };
        let s = serde_json::to_string(&r).expect("ser");
        let back: ToolsCallResult = serde_json::from_str(&s).expect("de");
        assert!(!back.is_error);
        assert_eq!(back.content.len(), 1);
    }
}
