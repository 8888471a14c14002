//! Stream reconstruction engine.
//!
//! Groups raw chunks into windows and folds each window into one
//! [`ReconstructedUnit`]. Text chunks are units of their own; tool call
//! fragments are held until the `tool_calls` finish marker closes the window,
//! so callers never see partial arguments.

mod accumulator;
mod classifier;
mod pipeline;
mod types;

pub use accumulator::Accumulator;
pub use classifier::{classify, WindowClassifier};
pub use pipeline::Reconstructor;
pub use types::{FunctionCall, MergeMode, ReconstructedUnit, ToolCall, WindowDecision};

#[cfg(feature = "streaming")]
pub use pipeline::{collect_units, reconstruct, reconstruct_with_cancel, ReconstructedStream};
