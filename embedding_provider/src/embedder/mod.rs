use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use ndarray::Array2;
use ort::{session::Session, value::Tensor, Error as OrtError};
use thiserror::Error;
use tokenizers::{Encoding, Tokenizer};

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OnnxLocal,
    Hashing,
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: ProviderKind,
    pub model_id: String,
    pub dimension: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("input text exceeds max length of {max_length} tokens, actual length: {actual_length}")]
    InputTooLong { max_length: usize, actual_length: usize },
    #[error("provider failure: {message}")]
    ProviderFailure { message: String },
}

/// Dense vector provider. Implementations must be side-effect free and must
/// return unit-length vectors of `dimension()` components.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;
    fn info(&self) -> &EmbedderInfo;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| EmbedderError::ProviderFailure { message: "empty batch result".into() })
    }
}

/// Configuration for the local ONNX embedder.
#[derive(Debug, Clone)]
pub struct OnnxLocalConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    /// Explicit ONNX Runtime shared library; `None` lets `ort` resolve the
    /// platform default.
    pub runtime_library_path: Option<PathBuf>,
    pub dimension: usize,
    pub max_input_length: usize,
    pub model_id: String,
}

/// Embedder driving a transformer model through the ONNX Runtime. The
/// session is serialized behind a mutex: callers from multiple indexing
/// workers funnel through it one batch at a time.
pub struct OnnxLocalEmbedder {
    info: EmbedderInfo,
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    pad_id: i64,
    max_input_length: usize,
}

static ORT_RUNTIME_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

impl OnnxLocalEmbedder {
    pub fn new(config: OnnxLocalConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        if config.max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }

        ensure_ort_initialized(config.runtime_library_path.as_deref())?;

        let model_path = resolve_existing_path(&config.model_path, "ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "tokenizer config")?;

        let session = Session::builder()
            .map_err(|err| map_ort_error("create session builder", err))?
            .commit_from_file(&model_path)
            .map_err(|err| map_ort_error("load ONNX model", err))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| map_tokenizer_error("load tokenizer", err))?;

        let pad_id = ["<pad>", "[PAD]"]
            .iter()
            .find_map(|t| tokenizer.token_to_id(t))
            .ok_or_else(|| EmbedderError::InvalidConfiguration {
                message: format!(
                    "tokenizer `{}` does not declare a padding token",
                    tokenizer_path.display()
                ),
            })? as i64;

        let info = EmbedderInfo {
            provider: ProviderKind::OnnxLocal,
            model_id: config.model_id,
            dimension: config.dimension,
        };

        Ok(Self {
            info,
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            pad_id,
            max_input_length: config.max_input_length,
        })
    }

    fn prepare_encodings(&self, texts: &[&str]) -> Result<Vec<Encoding>, EmbedderError> {
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| map_tokenizer_error("tokenize inputs", err))?;

        let max_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        if max_len > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length: max_len,
            });
        }
        Ok(encodings)
    }

    fn build_input_tensors(
        &self,
        encodings: &[Encoding],
    ) -> Result<(Tensor<i64>, Tensor<i64>, Vec<Vec<i64>>), EmbedderError> {
        let batch = encodings.len();
        let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_rows = Vec::with_capacity(batch);

        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (col, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[(row, col)] = id as i64;
                attention_mask[(row, col)] = m as i64;
            }
            for col in ids.len()..seq_len {
                input_ids[(row, col)] = self.pad_id;
                attention_mask[(row, col)] = 0;
            }
            attention_rows.push((0..seq_len).map(|i| attention_mask[(row, i)]).collect());
        }

        let input_ids =
            Tensor::from_array(input_ids).map_err(|err| map_ort_error("prepare input_ids", err))?;
        let attention_mask = Tensor::from_array(attention_mask)
            .map_err(|err| map_ort_error("prepare attention_mask", err))?;
        Ok((input_ids, attention_mask, attention_rows))
    }

    fn run_session(
        &self,
        input_ids: Tensor<i64>,
        attention_mask: Tensor<i64>,
    ) -> Result<(Vec<f32>, usize, usize, usize), EmbedderError> {
        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![input_ids, attention_mask])
            .map_err(|err| map_ort_error("execute ONNX session", err))?;

        let output = &outputs[0];
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| map_ort_error("extract output tensor", err))?;

        if shape.len() != 3 {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return Err(EmbedderError::ProviderFailure {
                message: format!("model output must be rank-3 [batch, seq_len, hidden], got shape {dims:?}"),
            });
        }

        let batch: usize = shape[0].try_into().unwrap_or(0);
        let seq_len: usize = shape[1].try_into().unwrap_or(0);
        let hidden: usize = shape[2].try_into().unwrap_or(0);
        Ok((data.to_vec(), batch, seq_len, hidden))
    }

    fn mean_pool(
        &self,
        data: &[f32],
        attention_rows: &[Vec<i64>],
        seq_len: usize,
        hidden: usize,
    ) -> Vec<Vec<f32>> {
        let mut results = Vec::with_capacity(attention_rows.len());
        for (b, mask) in attention_rows.iter().enumerate() {
            let mut sum = vec![0f32; hidden];
            let mut count = 0f32;
            for (t, &m) in mask.iter().take(seq_len).enumerate() {
                if m == 1 {
                    let base = (b * seq_len + t) * hidden;
                    for (h, s) in sum.iter_mut().enumerate() {
                        *s += data[base + h];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for s in sum.iter_mut() {
                    *s /= count;
                }
            }
            l2_normalize(&mut sum);
            results.push(sum);
        }
        results
    }
}

impl Embedder for OnnxLocalEmbedder {
    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self.prepare_encodings(texts)?;
        let (input_ids, attention_mask, attention_rows) = self.build_input_tensors(&encodings)?;
        let expected_seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let (raw_data, batch, seq_len, hidden) = self.run_session(input_ids, attention_mask)?;

        if batch != attention_rows.len() {
            return Err(EmbedderError::ProviderFailure {
                message: format!(
                    "model returned batch size {batch}, but prepared {} attention masks",
                    attention_rows.len()
                ),
            });
        }
        if seq_len != expected_seq_len {
            return Err(EmbedderError::ProviderFailure {
                message: format!("model returned sequence length {seq_len}, expected {expected_seq_len}"),
            });
        }

        let pooled = self.mean_pool(&raw_data, &attention_rows, seq_len, hidden);
        if pooled.iter().any(|v| v.len() != self.info.dimension) {
            return Err(EmbedderError::ProviderFailure {
                message: format!(
                    "pooled embedding dimension {} does not match configured dimension {}",
                    pooled.first().map(Vec::len).unwrap_or(0),
                    self.info.dimension
                ),
            });
        }
        Ok(pooled)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Deterministic seeded embedder. Stands in for the ONNX model in tests and
/// benchmarks: equal inputs give equal vectors, all unit-length.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    info: EmbedderInfo,
    base_seed: u64,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbedderError> {
        Self::with_seed(dimension, 0)
    }

    pub fn with_seed(dimension: usize, base_seed: u64) -> Result<Self, EmbedderError> {
        if dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::Hashing,
                model_id: format!("hashing-{dimension}"),
                dimension,
            },
            base_seed,
        })
    }

    /// Hash token-wise so texts sharing words land near each other; enough
    /// structure for ranking tests without a real model.
    fn generate(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.info.dimension];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            for (index, slot) in vector.iter_mut().enumerate() {
                let mut hasher = DefaultHasher::new();
                self.base_seed.hash(&mut hasher);
                index.hash(&mut hasher);
                token.hash(&mut hasher);
                let hash = hasher.finish();
                *slot += ((hash as f64) / (u64::MAX as f64) * 2.0 - 1.0) as f32;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts.iter().map(|t| self.generate(t)).collect())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Normalize in place; zero vectors stay zero.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn ensure_ort_initialized(runtime_library_path: Option<&Path>) -> Result<(), EmbedderError> {
    let requested = runtime_library_path.map(Path::to_path_buf);
    if let Some(existing) = ORT_RUNTIME_PATH.get() {
        if existing != &requested {
            return Err(EmbedderError::InvalidConfiguration {
                message: format!(
                    "ONNX Runtime already initialized with library {existing:?}; cannot reinitialize with {requested:?}"
                ),
            });
        }
        return Ok(());
    }
    let _ = ORT_RUNTIME_PATH.set(requested.clone());

    let init = match requested {
        Some(path) => ort::init_from(path.to_string_lossy().to_string()),
        None => ort::init(),
    };
    init.with_name("local-finder")
        .commit()
        .map_err(|err| map_ort_error("initialize ONNX Runtime environment", err))?;
    Ok(())
}

fn resolve_existing_path(path: &Path, description: &str) -> Result<PathBuf, EmbedderError> {
    fs::metadata(path).map_err(|_| EmbedderError::InvalidConfiguration {
        message: format!("{description} `{}` does not exist", path.display()),
    })?;
    path.canonicalize().map_err(|err| EmbedderError::ProviderFailure {
        message: format!("failed to canonicalize {description} `{}`: {err}", path.display()),
    })
}

fn map_ort_error(context: &str, err: OrtError) -> EmbedderError {
    EmbedderError::ProviderFailure { message: format!("{context} failed: {err}") }
}

fn map_tokenizer_error(context: &str, err: tokenizers::Error) -> EmbedderError {
    EmbedderError::ProviderFailure { message: format!("{context} failed: {err}") }
}
