//! Embedding backends.
//!
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint.
//! - [`VertexEmbedder`]: Vertex AI text embeddings via `:predict`.
//! - [`HashEmbedder`]: offline feature hashing, deterministic, no model needed.
//!
//! Remote backends are deterministic for a fixed model in practice, but the
//! services do not guarantee bit-identical vectors across model revisions.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::hash::Hasher;
use tracing::debug;
use twox_hash::XxHash64;

use docrag_core::config::{HttpSettings, LocalBackendSettings, ManagedBackendSettings};
use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;

use crate::http::HttpBackend;

pub const HASH_EMBEDDING_DIM: usize = 384;

pub struct OpenAiEmbedder {
    http: HttpBackend,
    url: String,
    api_key: Option<String>,
    model: String,
    id: String,
    batch_size: usize,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(local: &LocalBackendSettings, http: &HttpSettings, batch_size: usize) -> Result<Self> {
        if local.embedding_model.trim().is_empty() {
            return Err(Error::InvalidConfig("local.embedding_model must not be empty".into()));
        }
        Ok(Self {
            http: HttpBackend::new("openai-embeddings", http)?,
            url: format!("{}/embeddings", local.base_url.trim_end_matches('/')),
            api_key: local.api_key.clone().filter(|k| !k.is_empty()),
            model: local.embedding_model.clone(),
            id: format!("openai:{}", local.embedding_model),
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": batch });
        let mut response: OpenAiEmbeddingResponse =
            self.http.post_json(&self.url, self.api_key.as_deref(), &body).await?;
        if response.data.len() != batch.len() {
            return Err(Error::backend(
                self.http.name(),
                format!("expected {} embeddings, got {}", batch.len(), response.data.len()),
                false,
            ));
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch = n, size = batch.len(), "embedding batch");
            out.extend(self.embed_batch(batch).await.map_err(|e| in_batch(e, n))?);
        }
        check_dims(self.http.name(), &out)?;
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        single(self.http.name(), self.embed_batch(&[text.to_string()]).await?)
    }
}

pub struct VertexEmbedder {
    http: HttpBackend,
    url: String,
    access_token: String,
    id: String,
    batch_size: usize,
}

#[derive(Deserialize)]
struct VertexPredictResponse {
    predictions: Vec<VertexPrediction>,
}

#[derive(Deserialize)]
struct VertexPrediction {
    embeddings: VertexValues,
}

#[derive(Deserialize)]
struct VertexValues {
    values: Vec<f32>,
}

impl VertexEmbedder {
    pub fn new(managed: &ManagedBackendSettings, http: &HttpSettings, batch_size: usize) -> Result<Self> {
        let (project, token) = managed_credentials(managed)?;
        Ok(Self {
            http: HttpBackend::new("vertex-embeddings", http)?,
            url: format!(
                "{}/projects/{project}/locations/{}/publishers/google/models/{}:predict",
                managed.base_url(),
                managed.location,
                managed.embedding_model
            ),
            access_token: token,
            id: format!("vertex:{}", managed.embedding_model),
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_batch(&self, batch: &[String], task_type: &str) -> Result<Vec<Vec<f32>>> {
        let instances: Vec<_> = batch.iter().map(|t| json!({ "content": t, "task_type": task_type })).collect();
        let body = json!({ "instances": instances });
        let response: VertexPredictResponse =
            self.http.post_json(&self.url, Some(&self.access_token), &body).await?;
        if response.predictions.len() != batch.len() {
            return Err(Error::backend(
                self.http.name(),
                format!("expected {} predictions, got {}", batch.len(), response.predictions.len()),
                false,
            ));
        }
        Ok(response.predictions.into_iter().map(|p| p.embeddings.values).collect())
    }
}

#[async_trait]
impl Embedder for VertexEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch = n, size = batch.len(), "embedding batch");
            out.extend(
                self.embed_batch(batch, "RETRIEVAL_DOCUMENT")
                    .await
                    .map_err(|e| in_batch(e, n))?,
            );
        }
        check_dims(self.http.name(), &out)?;
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        single(self.http.name(), self.embed_batch(&[text.to_string()], "RETRIEVAL_QUERY").await?)
    }
}

/// Bag-of-words feature hashing into `dim` buckets, L2-normalised.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hash:{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty());
        for token in tokens {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.to_lowercase().as_bytes());
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            // no tokens: a fixed direction keeps cosine defined
            let fill = 1.0 / (self.dim as f32).sqrt();
            return vec![fill; self.dim];
        }
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HASH_EMBEDDING_DIM)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

pub(crate) fn managed_credentials(managed: &ManagedBackendSettings) -> Result<(String, String)> {
    let project = managed
        .project_id
        .clone()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| Error::InvalidConfig("managed.project_id is required for the managed provider".into()))?;
    let token = managed
        .access_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::InvalidConfig("managed.access_token is required for the managed provider".into()))?;
    Ok((project, token))
}

fn in_batch(err: Error, batch: usize) -> Error {
    match err {
        Error::Backend { backend, message, retryable } => {
            Error::Backend { backend, message: format!("batch {batch}: {message}"), retryable }
        }
        other => other,
    }
}

fn single(backend: &str, mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    vectors
        .pop()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::backend(backend, "empty embedding returned", false))
}

fn check_dims(backend: &str, vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else { return Ok(()) };
    if first.is_empty() {
        return Err(Error::backend(backend, "empty embedding returned", false));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
        return Err(Error::backend(
            backend,
            format!("inconsistent dimensionality: {} vs {}", first.len(), bad.len()),
            false,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hash_embeddings_are_deterministic_and_normalised() {
        let e = HashEmbedder::new(64);
        let a = e.embed_text("Employees get 15 days of paid leave");
        let b = e.embed_text("Employees get 15 days of paid leave");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_are_closer() {
        let e = HashEmbedder::default();
        let doc = e.embed_text("paid leave policy");
        let near = e.embed_text("Leave policy");
        let far = e.embed_text("quarterly revenue forecast");
        assert!(cosine(&doc, &near) > cosine(&doc, &far));
    }

    #[test]
    fn blank_text_still_has_a_direction() {
        let v = HashEmbedder::new(4).embed_text("  ?! ");
        assert!(v.iter().all(|x| (*x - 0.5).abs() < 1e-6));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let err = check_dims("t", &[vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, Error::Backend { retryable: false, .. }));
    }
}
