// Adapters layer: concrete implementations for external systems.

pub mod code_block;
pub mod openai;

pub use openai::ChatCompletionsClient;
