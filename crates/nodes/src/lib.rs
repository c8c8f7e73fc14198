//! `nodes` crate: the `StepTransform` trait and its implementations.
//!
//! Every step of a workflow is executed through [`StepTransform`]: text plus
//! a natural-language instruction in, text (or an error message) out. The
//! engine crate dispatches through this trait object and never sees the LLM.

pub mod error;
pub mod traits;
pub mod prompt;
pub mod gemini;
pub mod mock;

pub use error::TransformError;
pub use gemini::{GeminiConfig, GeminiTransform, LlmTransform};
pub use traits::{StepRole, StepTransform, TransformOutcome, TransformRequest};
