//! Window classification.
//!
//! Decides for each chunk whether it stands alone, opens a tool call window,
//! continues one, or closes one.

use super::types::{MergeMode, WindowDecision};
use crate::RawChunk;

/// Pure classification of one chunk against the current accumulation state.
///
/// - Not accumulating: a chunk with tool fragments opens a window unless it
///   also carries `finish_reason == "tool_calls"`, in which case the whole
///   call fit in one chunk and it forms its own window. Every other chunk
///   forms its own window too.
/// - Accumulating: `finish_reason == "tool_calls"` closes the window,
///   anything else joins it.
pub fn classify(chunk: &RawChunk, in_tool_accumulation: bool) -> WindowDecision {
    if in_tool_accumulation {
        let closes_window = chunk.finishes_tool_calls();
        return WindowDecision {
            in_tool_accumulation: !closes_window,
            closes_window,
            mode: MergeMode::Continuation,
        };
    }

    let opens_window = !chunk.tool_call_deltas.is_empty() && !chunk.finishes_tool_calls();
    WindowDecision {
        in_tool_accumulation: opens_window,
        closes_window: !opens_window,
        mode: MergeMode::Open,
    }
}

/// Stateful classifier for one completion's stream
#[derive(Debug, Default)]
pub struct WindowClassifier {
    in_tool_accumulation: bool,
}

impl WindowClassifier {
    /// Create a classifier outside any tool call window
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the next chunk and advance the state
    pub fn observe(&mut self, chunk: &RawChunk) -> WindowDecision {
        let decision = classify(chunk, self.in_tool_accumulation);
        self.in_tool_accumulation = decision.in_tool_accumulation;
        decision
    }

    /// Whether a tool call window is currently open
    pub fn in_tool_accumulation(&self) -> bool {
        self.in_tool_accumulation
    }
}
