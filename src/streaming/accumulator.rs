//! Chunk merging.

use indexmap::IndexMap;

use super::types::{FunctionCall, MergeMode, ReconstructedUnit, ToolCall};
use crate::{FinishReason, RawChunk, StreamError, ToolCallFragment, Usage};

/// Tool call being assembled inside one window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PendingToolCall {
    id: Option<String>,
    r#type: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Merged state of the currently open window.
///
/// `Accumulator::default()` is the identity value: no metadata, no content,
/// no tool calls. Tool calls are keyed by their wire `index` and keep the
/// order in which each index was first seen, so sparse or interleaved
/// indices come out in the order the service introduced them.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    id: Option<String>,
    model: Option<String>,
    created_at: Option<i64>,
    model_version: Option<String>,
    role: Option<String>,
    content: Option<String>,
    tool_calls: IndexMap<u32, PendingToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    chunks: usize,
    max_argument_bytes: Option<usize>,
}

/// Keep the first value seen.
fn keep_first<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Keep the last value seen.
fn keep_last<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

impl Accumulator {
    /// Create the identity accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an identity accumulator that caps each tool call's arguments
    pub fn with_argument_limit(max_argument_bytes: Option<usize>) -> Self {
        Self {
            max_argument_bytes,
            ..Self::default()
        }
    }

    /// Number of chunks merged so far
    pub fn len(&self) -> usize {
        self.chunks
    }

    /// Whether nothing has been merged yet
    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }

    /// Indices of the tool calls seen so far, in first-seen order
    pub fn tool_call_indices(&self) -> Vec<u32> {
        self.tool_calls.keys().copied().collect()
    }

    /// Fold one chunk into the window.
    ///
    /// Metadata and role keep their first value; finish reason and usage keep
    /// their last; content and argument fragments are appended in arrival
    /// order. In [`MergeMode::Continuation`] an unseen index is accepted only
    /// when its fragment introduces the call with an `id`.
    pub fn merge(&mut self, chunk: RawChunk, mode: MergeMode) -> crate::Result<()> {
        let RawChunk {
            id,
            model,
            created_at,
            model_version,
            role,
            content_delta,
            tool_call_deltas,
            finish_reason,
            usage,
        } = chunk;

        keep_first(&mut self.id, id);
        keep_first(&mut self.model, model);
        keep_first(&mut self.created_at, created_at);
        keep_first(&mut self.model_version, model_version);
        keep_first(&mut self.role, role);

        let content = self.content.get_or_insert_with(String::new);
        if let Some(delta) = content_delta {
            content.push_str(&delta);
        }

        for fragment in tool_call_deltas {
            self.merge_fragment(fragment, mode)?;
        }

        keep_last(&mut self.finish_reason, finish_reason);
        keep_last(&mut self.usage, usage);
        self.chunks += 1;
        Ok(())
    }

    fn merge_fragment(&mut self, fragment: ToolCallFragment, mode: MergeMode) -> crate::Result<()> {
        let ToolCallFragment {
            index,
            id,
            r#type,
            function_name,
            arguments_fragment,
        } = fragment;

        if mode == MergeMode::Continuation && id.is_none() && !self.tool_calls.contains_key(&index) {
            return Err(StreamError::MalformedFragment {
                index,
                reason: "continuation fragment for a tool call that was never introduced".to_string(),
            });
        }

        let limit = self.max_argument_bytes;
        let entry = self.tool_calls.entry(index).or_insert_with(|| {
            tracing::trace!(index, "tool call introduced");
            PendingToolCall::default()
        });

        keep_first(&mut entry.id, id);
        keep_first(&mut entry.r#type, r#type);
        keep_first(&mut entry.name, function_name);

        if let Some(delta) = arguments_fragment {
            if let Some(limit) = limit {
                if entry.arguments.len() + delta.len() > limit {
                    return Err(StreamError::ArgumentsTooLarge { index, limit });
                }
            }
            entry.arguments.push_str(&delta);
        }
        Ok(())
    }

    /// Close the window and expose its value.
    ///
    /// Fails when the window holds a tool call without an id or function
    /// name, or holds tool calls without the `tool_calls` finish marker.
    pub fn finish(self, default_tool_type: &str) -> crate::Result<ReconstructedUnit> {
        if !self.tool_calls.is_empty() && self.finish_reason != Some(FinishReason::ToolCalls) {
            let index = self.tool_calls.keys().next().copied().unwrap_or_default();
            return Err(StreamError::MalformedFragment {
                index,
                reason: "tool call window closed without finish_reason \"tool_calls\"".to_string(),
            });
        }

        let mut tool_calls = Vec::with_capacity(self.tool_calls.len());
        for (index, pending) in self.tool_calls {
            let id = pending.id.ok_or_else(|| StreamError::MalformedFragment {
                index,
                reason: "tool call finished without an id".to_string(),
            })?;
            let name = pending.name.ok_or_else(|| StreamError::MalformedFragment {
                index,
                reason: "tool call finished without a function name".to_string(),
            })?;
            tool_calls.push(ToolCall {
                index,
                id,
                r#type: pending.r#type.unwrap_or_else(|| default_tool_type.to_string()),
                function: FunctionCall {
                    name,
                    arguments: pending.arguments,
                },
            });
        }

        Ok(ReconstructedUnit {
            id: self.id,
            model: self.model,
            created_at: self.created_at,
            model_version: self.model_version,
            role: self.role,
            content: self.content.unwrap_or_default(),
            tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
        })
    }
}
