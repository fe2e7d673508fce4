use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Completion provider error: {0}")]
    CompletionProvider(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod completions;
pub mod config;
pub mod embeddings;
pub mod history;
pub mod index;
pub mod rag;
pub mod server;
pub mod session;
