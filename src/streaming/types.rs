//! Type definitions for reconstructed output.

use serde::{Deserialize, Serialize};

use crate::{FinishReason, Usage};

/// Function call of a finished tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, concatenated in arrival order
    pub arguments: String,
}

/// A fully assembled tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Position in the assistant message's tool call list
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    /// Parse the assembled arguments.
    ///
    /// Empty arguments parse as an empty object, since some services send no
    /// argument fragments at all for zero-parameter functions.
    pub fn parse_arguments(&self) -> crate::Result<serde_json::Value> {
        if self.function.arguments.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        Ok(serde_json::from_str(&self.function.arguments)?)
    }
}

/// One closed window, handed to the caller.
///
/// A unit with tool calls always has `finish_reason == ToolCalls`, and each of
/// its tool calls carries an id, a type, a function name and complete
/// arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedUnit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Text accumulated over the window (empty when no deltas arrived)
    #[serde(default)]
    pub content: String,
    /// Tool calls in first-seen order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ReconstructedUnit {
    /// Whether this unit carries tool calls
    pub fn is_tool_call(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether this unit ends the completion
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Outcome of classifying one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    /// Accumulation state after this chunk
    pub in_tool_accumulation: bool,
    /// Whether this chunk closes the current window
    pub closes_window: bool,
    /// How the chunk's tool fragments may be merged
    pub mode: MergeMode,
}

/// How the merger treats tool call indices it has not seen yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// First chunk of a window: any index may start a new entry
    Open,
    /// Later chunk of a tool call window: a new index must introduce its call
    Continuation,
}
