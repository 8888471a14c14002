//! Reconstruction settings.

use serde::{Deserialize, Serialize};

/// Default cap on one tool call's accumulated arguments (1 MiB)
pub const DEFAULT_MAX_ARGUMENT_BYTES: usize = 1_048_576;

/// Default type for tool calls whose fragments never named one
pub const DEFAULT_TOOL_TYPE: &str = "function";

/// Settings for one reconstruction pipeline.
///
/// Deserializes with defaults for every missing field, so it can be embedded
/// in a host application's own config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Per tool call cap on argument bytes; `None` disables the cap
    pub max_argument_bytes: Option<usize>,
    /// Type assigned to a finished tool call that never carried `type`
    pub default_tool_type: String,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            max_argument_bytes: Some(DEFAULT_MAX_ARGUMENT_BYTES),
            default_tool_type: DEFAULT_TOOL_TYPE.to_string(),
        }
    }
}

impl ReconstructionConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the argument cap
    pub fn with_max_argument_bytes(mut self, limit: usize) -> Self {
        self.max_argument_bytes = Some(limit);
        self
    }

    /// Remove the argument cap
    pub fn without_argument_cap(mut self) -> Self {
        self.max_argument_bytes = None;
        self
    }

    /// Set the fallback tool type
    pub fn with_default_tool_type(mut self, kind: impl Into<String>) -> Self {
        self.default_tool_type = kind.into();
        self
    }
}
