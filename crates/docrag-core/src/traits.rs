use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RetrievalResult, SearchMode};

/// Maps text into a fixed-dimensionality vector space.
///
/// All vectors produced by one instance share a dimensionality and belong to
/// the space named by `embedder_id`; indexes record that id at build time.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the backend and model (e.g. `openai:text-embedding-3-small`).
    fn embedder_id(&self) -> &str;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Completes a prompt with generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Anything that turns a query into ranked chunks.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;
    async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult>;

    /// Retrieve with an explicit ranking mode. Retrievers that rank on the
    /// service side ignore `mode`.
    async fn retrieve_ranked(&self, query: &str, k: usize, mode: SearchMode) -> Result<RetrievalResult> {
        let _ = mode;
        self.retrieve(query, k).await
    }
}
