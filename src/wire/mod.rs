//! Wire chunk decoding.
//!
//! The service sends one JSON object per SSE `data:` line:
//!
//! ```json
//! {"id":"cmpl-1","model_id":"m","created_at":1700000000,"model_version":"1",
//!  "role":"assistant","content":"Hel","tool_calls":[],"finish_reason":null,"usage":null}
//! ```
//!
//! Tool call fragments nest the function name and arguments:
//! `{"index":0,"id":"call_1","type":"function","function":{"name":"f","arguments":"{\"x\":"}}`.
//! The stream ends with `data: [DONE]`.

use serde::{Deserialize, Serialize};

use crate::{RawChunk, ToolCallFragment, Usage};

/// Sentinel payload marking the end of the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// One chunk exactly as it appears on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Tool call fragment on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<WireFunction>,
}

/// Function part of a wire tool call fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl From<WireToolCall> for ToolCallFragment {
    fn from(wire: WireToolCall) -> Self {
        let (function_name, arguments_fragment) = match wire.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };
        Self {
            index: wire.index,
            id: wire.id,
            r#type: wire.r#type,
            function_name,
            arguments_fragment,
        }
    }
}

impl From<WireChunk> for RawChunk {
    fn from(wire: WireChunk) -> Self {
        Self {
            id: wire.id,
            model: wire.model_id,
            created_at: wire.created_at,
            model_version: wire.model_version,
            role: wire.role,
            content_delta: wire.content,
            tool_call_deltas: wire
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(ToolCallFragment::from)
                .collect(),
            finish_reason: wire.finish_reason.map(Into::into),
            usage: wire.usage,
        }
    }
}

/// Extract the payload of an SSE `data:` line.
///
/// Blank lines, `:` comments and other fields (`event:`, `id:`, `retry:`)
/// yield `None`.
pub fn parse_sse_line(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

/// Decode one `data:` payload.
///
/// Returns `Ok(None)` for the `[DONE]` sentinel.
pub fn decode_data(data: &str) -> crate::Result<Option<RawChunk>> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(None);
    }
    let wire: WireChunk = serde_json::from_str(data)?;
    Ok(Some(wire.into()))
}
