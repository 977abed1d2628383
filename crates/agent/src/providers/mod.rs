//! Concrete engine providers. Both expose the same generate capability and
//! run their calls under the shared transport retry schedule in `engine`.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// Token budget forwarded to both providers per generation call.
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 2000;
