use std::path::PathBuf;

use crate::embedder::OnnxLocalConfig;

/// Default settings for the local ONNX embedder.
#[derive(Debug, Clone, Copy)]
pub struct OnnxLocalDefaults {
    pub model_path: &'static str,
    pub tokenizer_path: &'static str,
    pub embedding_dimension: usize,
    pub max_input_tokens: usize,
    pub model_id: &'static str,
}

/// Shared defaults so the host shell and tests stay in sync. bge-m3 is
/// multilingual, which matters for mixed Korean/English corpora.
pub const ONNX_LOCAL_DEFAULTS: OnnxLocalDefaults = OnnxLocalDefaults {
    model_path: "models/bge-m3-onnx/model.onnx",
    tokenizer_path: "models/bge-m3-onnx/tokenizer.json",
    embedding_dimension: 1024,
    max_input_tokens: 8192,
    model_id: "bge-m3-onnx",
};

/// Build an [`OnnxLocalConfig`] from the shared defaults, resolving asset
/// paths relative to this crate so the working directory does not matter.
pub fn default_local_config() -> OnnxLocalConfig {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    OnnxLocalConfig {
        model_path: base.join(ONNX_LOCAL_DEFAULTS.model_path),
        tokenizer_path: base.join(ONNX_LOCAL_DEFAULTS.tokenizer_path),
        runtime_library_path: None,
        dimension: ONNX_LOCAL_DEFAULTS.embedding_dimension,
        max_input_length: ONNX_LOCAL_DEFAULTS.max_input_tokens,
        model_id: ONNX_LOCAL_DEFAULTS.model_id.into(),
    }
}
