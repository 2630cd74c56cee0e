//! Sentence embedding (§4.2), mirroring the lineage's
//! `pipeline::embedding::EmbeddingService` construction but with a stricter
//! failure contract: initialization failure is fatal, and a per-call failure
//! skips only the offending article rather than substituting a cached
//! fallback vector.

use std::sync::Mutex;

use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
};
use thiserror::Error;

use crate::util::cosine::{cosine_similarity, normalize};

pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to initialize sentence embedding model: {0}")]
    Init(String),
    #[error("failed to embed text: {0}")]
    Inference(String),
    #[error("model returned an embedding of unexpected dimensionality {0}, expected {EMBEDDING_DIM}")]
    UnexpectedDimension(usize),
}

pub trait Embedder: Send + Sync {
    /// Mean-pooled, L2-normalized embedding of `text`. A failure here drops
    /// only the calling article from the current pipeline run (§4.2).
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// MiniLM-family sentence embedding model, loaded once at startup.
pub struct MiniLmEmbedder {
    model: Mutex<SentenceEmbeddingsModel>,
}

impl MiniLmEmbedder {
    /// Loads the embedding model. Failure here is fatal to the process: the
    /// pipeline cannot enrich anything without an embedder.
    pub fn new() -> Result<Self, EmbeddingError> {
        let model = SentenceEmbeddingsBuilder::remote(SentenceEmbeddingsModelType::AllMiniLmL12V2)
            .create_model()
            .map_err(|error| EmbeddingError::Init(error.to_string()))?;
        Ok(Self { model: Mutex::new(model) })
    }
}

impl Embedder for MiniLmEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = self.model.lock().expect("embedding model mutex poisoned");
        let embeddings = model
            .encode(&[text])
            .map_err(|error| EmbeddingError::Inference(error.to_string()))?;
        let mut vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Inference("model returned no embeddings".to_string()))?;
        if vector.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::UnexpectedDimension(vector.len()));
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

/// Re-exported for the clusterer and refiner, which compare embeddings
/// produced by this module.
#[must_use]
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b)
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeEmbedder;
    use super::*;

    #[test]
    fn fake_embedder_produces_unit_vectors() {
        let embedder = FakeEmbedder::default();
        let vector = embedder.embed("Parliament passes new bill").expect("embed ok");
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_eq!(vector.len(), EMBEDDING_DIM);
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn fake_embedder_respects_configured_failure() {
        let embedder = FakeEmbedder::default();
        embedder.fail_on("bad text");
        assert!(embedder.embed("bad text").is_err());
        assert!(embedder.embed("good text").is_ok());
    }

    #[test]
    fn similarity_of_same_text_embedding_is_one() {
        let embedder = FakeEmbedder::default();
        let a = embedder.embed("same text").expect("embed ok");
        let b = embedder.embed("same text").expect("embed ok");
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-5);
    }
}
