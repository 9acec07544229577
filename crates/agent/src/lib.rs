pub mod analyzer;
pub mod embeddings;
pub mod fingerprint;
pub mod llm;

pub use analyzer::{AiAnalyzer, AnalyzerContext};
pub use embeddings::EmbeddingService;
pub use llm::{ChatMessage, ChatRole, LlmClient, LlmError, OpenAiCompatClient};
