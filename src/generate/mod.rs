pub mod backend;
pub mod parse;
pub mod reflections;
pub mod story;

pub use backend::{ChatBackend, Completion, CompletionRequest, FinishReason, GenerationBackend,
                  GenerationError, ScriptedBackend};
