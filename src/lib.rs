//! Completion Stream
//!
//! This crate turns the incrementally-streamed output of a chat-completion
//! service into discrete, directly usable units. The service pushes small
//! JSON chunks, each carrying a few characters of text or a fragment of a
//! tool call's JSON arguments. Callers want finished pieces instead: a text
//! delta they can render, or a tool invocation whose arguments are complete.
//!
//! ## How chunks become units
//!
//! 1. A [`WindowClassifier`] decides, chunk by chunk, whether the chunk stands
//!    alone or belongs to a tool-call window that stays open until a chunk with
//!    `finish_reason == "tool_calls"` arrives.
//! 2. An [`Accumulator`] folds every chunk of a window into one value.
//! 3. The [`Reconstructor`] drives both and emits one [`ReconstructedUnit`] per
//!    closed window, in arrival order.
//!
//! Plain text chunks therefore come out one unit per chunk, while a tool call
//! split across many chunks comes out once, with its arguments concatenated in
//! arrival order.
//!
//! ## Usage
//!
//! ```rust
//! use completion_stream::{RawChunk, Reconstructor, ReconstructionConfig, ToolCallFragment};
//!
//! let mut reconstructor = Reconstructor::new(ReconstructionConfig::default());
//!
//! let open = RawChunk::default().with_tool_call(
//!     ToolCallFragment::new(0)
//!         .with_id("call_2")
//!         .with_function_name("f")
//!         .with_arguments("{\"x\":"),
//! );
//! let close = RawChunk::default()
//!     .with_tool_call(ToolCallFragment::new(0).with_arguments("1}"))
//!     .with_finish_reason("tool_calls");
//!
//! assert!(reconstructor.push(open).unwrap().is_none());
//! let unit = reconstructor.push(close).unwrap().expect("window closed");
//! assert_eq!(unit.tool_calls[0].function.arguments, "{\"x\":1}");
//! reconstructor.finish().unwrap();
//! ```
//!
//! With the default `streaming` feature, [`reconstruct`] wraps the same logic
//! around any `futures` stream of chunks and adds cooperative cancellation.

use serde::{Deserialize, Serialize};

// ============================================================================
// Errors and Configuration
// ============================================================================

pub mod config;
pub mod error;

pub use config::ReconstructionConfig;
pub use error::{Result, StreamError};

// ============================================================================
// Wire Decoding
// ============================================================================

pub mod wire;
pub use wire::{decode_data, parse_sse_line, WireChunk};

// ============================================================================
// Reconstruction Engine
// ============================================================================

pub mod streaming;
pub use streaming::{
    Accumulator, FunctionCall, MergeMode, ReconstructedUnit, Reconstructor, ToolCall,
    WindowClassifier, WindowDecision,
};

#[cfg(feature = "streaming")]
pub use streaming::{collect_units, reconstruct, reconstruct_with_cancel, ReconstructedStream};

// ============================================================================
// Core Chunk Types
// ============================================================================

/// One wire-level update of an in-progress completion.
///
/// Chunks are produced by the decoder in strict arrival order and consumed
/// exactly once by the reconstruction engine. Identifying metadata (`id`,
/// `model`, `created_at`, `model_version`) and `role` usually appear only on
/// the first chunk of a completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChunk {
    /// Completion identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Model that produced the completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Creation timestamp (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Model version reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Conversation role of the message being assembled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Fragment of generated text to append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<String>,
    /// Tool call fragments carried by this chunk, in wire order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_deltas: Vec<ToolCallFragment>,
    /// Terminal marker; `None` means the completion is not finished yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Token counts; authoritative and final when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl RawChunk {
    /// Create a chunk carrying only a text delta
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content_delta: Some(delta.into()),
            ..Self::default()
        }
    }

    /// Set the completion identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the creation timestamp
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set the model version
    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    /// Set the role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the text delta
    pub fn with_content(mut self, delta: impl Into<String>) -> Self {
        self.content_delta = Some(delta.into());
        self
    }

    /// Append a tool call fragment
    pub fn with_tool_call(mut self, fragment: ToolCallFragment) -> Self {
        self.tool_call_deltas.push(fragment);
        self
    }

    /// Set the finish reason
    pub fn with_finish_reason(mut self, reason: impl Into<FinishReason>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// Set the usage summary
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Whether this chunk carries the `tool_calls` finish marker
    pub fn finishes_tool_calls(&self) -> bool {
        matches!(self.finish_reason, Some(FinishReason::ToolCalls))
    }
}

/// Partial description of one tool invocation inside a chunk.
///
/// `index` is stable across every fragment of the same call; `id`, `type`
/// and the function name typically appear only on the fragment that
/// introduces the call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    /// Position of the call in the assistant message's tool call list
    pub index: u32,
    /// Invocation identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Invocation kind (usually "function")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    /// Name of the function to call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Substring of the JSON-encoded arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_fragment: Option<String>,
}

impl ToolCallFragment {
    /// Create an empty fragment for the given index
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Set the invocation identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the invocation kind
    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.r#type = Some(kind.into());
        self
    }

    /// Set the function name
    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    /// Set the arguments fragment
    pub fn with_arguments(mut self, fragment: impl Into<String>) -> Self {
        self.arguments_fragment = Some(fragment.into());
        self
    }

    /// Whether this fragment introduces a new call
    pub fn introduces_call(&self) -> bool {
        self.id.is_some()
    }
}

/// Token-count summary for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,
    /// Prompt plus completion
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// Create a usage summary; the total is computed
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Why the service stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// Natural end of the message
    Stop,
    /// Token limit reached
    Length,
    /// The model requested one or more tool calls
    ToolCalls,
    /// Output was filtered
    ContentFilter,
    /// The service reported an error
    Error,
    /// Any value this crate does not know about
    Other(String),
}

impl FinishReason {
    /// Convert to the wire representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Error => "error",
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for FinishReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_string_conversion() {
        assert_eq!(FinishReason::from("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from("length").as_str(), "length");
        assert_eq!(
            FinishReason::from("something_new"),
            FinishReason::Other("something_new".to_string())
        );
        assert_eq!(FinishReason::Other("x".into()).to_string(), "x");
    }

    #[test]
    fn test_finish_reason_serializes_as_plain_string() {
        let json = serde_json::to_value(FinishReason::ToolCalls).unwrap();
        assert_eq!(json, serde_json::json!("tool_calls"));

        let parsed: FinishReason = serde_json::from_value(serde_json::json!("content_filter")).unwrap();
        assert_eq!(parsed, FinishReason::ContentFilter);
    }

    #[test]
    fn test_chunk_builders() {
        let chunk = RawChunk::text("Hel")
            .with_id("cmpl-1")
            .with_role("assistant")
            .with_finish_reason("stop");

        assert_eq!(chunk.content_delta.as_deref(), Some("Hel"));
        assert_eq!(chunk.id.as_deref(), Some("cmpl-1"));
        assert_eq!(chunk.role.as_deref(), Some("assistant"));
        assert_eq!(chunk.finish_reason, Some(FinishReason::Stop));
        assert!(!chunk.finishes_tool_calls());
    }

    #[test]
    fn test_fragment_introduces_call_only_with_id() {
        assert!(ToolCallFragment::new(0).with_id("call_1").introduces_call());
        assert!(!ToolCallFragment::new(0).with_arguments("{}").introduces_call());
    }

    #[test]
    fn test_usage_total_is_computed() {
        let usage = Usage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_empty_chunk_serializes_to_empty_object() {
        let json = serde_json::to_value(RawChunk::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
