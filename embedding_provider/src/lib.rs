//! Embedding providers for dense retrieval.
//!
//! The engine is polymorphic over the [`embedder::Embedder`] trait: a local
//! ONNX model when one is installed, nothing at all in degraded mode, and a
//! deterministic hashing provider for tests. All providers return
//! L2-normalized vectors so dot product equals cosine similarity downstream.

pub mod config;
pub mod embedder;

pub use embedder::{
    Embedder, EmbedderError, EmbedderInfo, HashingEmbedder, OnnxLocalConfig, OnnxLocalEmbedder,
    ProviderKind,
};
