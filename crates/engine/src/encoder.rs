//! Sentence encoder
//!
//! Encodes arbitrary text (any language) into a unit vector of fixed
//! dimension using a multilingual mini transformer served through ONNX
//! Runtime. Blank input encodes to the zero vector, which callers treat as
//! "no embedding". An advisory LRU cache keyed on the exact text
//! deduplicates repeated encodes; it never affects correctness.

use async_trait::async_trait;
use moka::future::Cache;
use mood_gateway_core::{normalize_vector, GatewayError};
use ndarray::{Array2, Axis};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Embedding dimensionality of the fixed encoder model.
pub const EMBEDDING_DIM: usize = 384;

/// Maximum token sequence length fed to the model.
const MAX_SEQUENCE_LEN: usize = 256;

/// Inference batch size cap.
const MAX_BATCH_SIZE: usize = 32;

/// Advisory cache capacity (exact-text keys).
const CACHE_CAPACITY: u64 = 10_000;

/// Text-to-vector encoding seam.
///
/// `encode` must return either a unit vector of `dimension()` entries or the
/// zero vector (blank input).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError>;

    fn dimension(&self) -> usize;
}

/// ONNX-backed sentence encoder.
pub struct TextEncoder {
    session: Arc<RwLock<Session>>,
    cache: Cache<String, Vec<f32>>,
}

impl TextEncoder {
    /// Load the encoder model from disk.
    pub fn new(model_path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let start = std::time::Instant::now();

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(model_path.as_ref()))
            .map_err(|e| GatewayError::Fatal(format!("failed to load encoder model: {}", e)))?;

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            dim = EMBEDDING_DIM,
            "Sentence encoder loaded"
        );

        Ok(Self {
            session: Arc::new(RwLock::new(session)),
            cache: Cache::new(CACHE_CAPACITY),
        })
    }

    async fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let token_rows: Vec<Vec<i64>> = texts.iter().map(|t| tokenize(t)).collect();
        let max_len = token_rows.iter().map(|r| r.len()).max().unwrap_or(1);
        let batch_size = token_rows.len();

        let mut padded = Vec::with_capacity(batch_size * max_len);
        for row in &token_rows {
            padded.extend(row);
            padded.resize(padded.len() + (max_len - row.len()), 0);
        }

        let input_ids = Array2::from_shape_vec((batch_size, max_len), padded)
            .map_err(|e| GatewayError::Fatal(format!("bad input shape: {}", e)))?;

        let mut session = self.session.write().await;

        let input_tensor = Tensor::from_array(input_ids)
            .map_err(|e| GatewayError::Fatal(format!("tensor build failed: {}", e)))?;
        let outputs = session
            .run(ort::inputs!["input_ids" => input_tensor])
            .map_err(|e| GatewayError::Transient(format!("encoder inference failed: {}", e)))?;

        let output = outputs["embeddings"]
            .try_extract_array::<f32>()
            .map_err(|e| GatewayError::Fatal(format!("bad encoder output: {}", e)))?
            .to_owned();

        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mut embedding: Vec<f32> = if output.ndim() == 2 {
                output.index_axis(Axis(0), i).iter().copied().collect()
            } else if output.ndim() == 3 {
                // [batch, seq, dim]: mean pooling over the sequence axis
                let row = output.index_axis(Axis(0), i);
                let mean = row
                    .mean_axis(Axis(0))
                    .ok_or_else(|| GatewayError::Fatal("empty sequence axis".into()))?;
                mean.iter().copied().collect()
            } else {
                return Err(GatewayError::Fatal(format!(
                    "unexpected encoder output shape: {:?}",
                    output.shape()
                )));
            };

            if embedding.len() != EMBEDDING_DIM {
                return Err(GatewayError::Fatal(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    EMBEDDING_DIM,
                    embedding.len()
                )));
            }

            normalize_vector(&mut embedding);
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for TextEncoder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; EMBEDDING_DIM]);
        }

        if let Some(cached) = self.cache.get(text).await {
            debug!("Encoder cache hit");
            return Ok(cached);
        }

        let mut batch = self.run_batch(&[text]).await?;
        let embedding = batch.pop().ok_or_else(|| {
            GatewayError::Fatal("encoder returned no rows for single input".into())
        })?;

        self.cache.insert(text.to_string(), embedding.clone()).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results[i] = Some(vec![0.0; EMBEDDING_DIM]);
            } else if let Some(cached) = self.cache.get(text).await {
                results[i] = Some(cached);
            } else {
                pending.push(i);
            }
        }

        for chunk in pending.chunks(MAX_BATCH_SIZE) {
            let chunk_texts: Vec<&str> = chunk.iter().map(|&i| texts[i].as_str()).collect();
            let embeddings = self.run_batch(&chunk_texts).await?;

            for (&i, embedding) in chunk.iter().zip(embeddings) {
                self.cache.insert(texts[i].clone(), embedding.clone()).await;
                results[i] = Some(embedding);
            }
        }

        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| GatewayError::Fatal("missing embeddings in batch result".into()))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Simplified multilingual tokenization: whitespace words hashed into a
/// fixed vocabulary. The model was exported with a matching embedding table.
fn tokenize(text: &str) -> Vec<i64> {
    const VOCAB_SIZE: u64 = 250_000;

    let tokens: Vec<i64> = text
        .split_whitespace()
        .take(MAX_SEQUENCE_LEN)
        .map(|word| {
            let mut hash: u64 = 1469598103934665603;
            for b in word.to_lowercase().bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            (hash % VOCAB_SIZE) as i64 + 1
        })
        .collect();

    if tokens.is_empty() {
        vec![0]
    } else {
        tokens
    }
}
