//! AI layer: the structured-generation oracle, consensus over repeated extractions, embeddings.

pub mod arithmetic;
pub mod consensus;
pub mod embedder;
mod error;
pub mod extract;
pub mod oracle;
pub mod prompt;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(test)]
mod testing;

pub use consensus::{ConsensusConfig, ConsensusMode, ConsensusResolver, vote};
pub use embedder::{Embedder, enrich};
pub use error::AiError;
pub use extract::ExtractionClient;
pub use oracle::{Oracle, OracleRequest, ToolSpec};
pub use prompt::RetryPolicy;

#[cfg(feature = "openai")]
pub use openai::{OpenAiClient, OpenAiEmbedder, OpenAiOracle};
