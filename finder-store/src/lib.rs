//! The three coupled persistent stores behind the engine.
//!
//! Ownership is strict: the manifest owns `FileRecord`s, the vector store
//! owns `ChunkRecord`s, the lexical store owns `LexicalDocument`s.
//! Cross-references travel as opaque ids only.

pub mod lexical;
pub mod manifest;
pub mod vector;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("incompatible schema version `{found}` (expected `{expected}`)")]
    Schema { found: String, expected: String },
    #[error("embedding dimension mismatch: got {got}, store holds {expected}")]
    Dimension { got: usize, expected: usize },
}
