use async_trait::async_trait;
use std::sync::Arc;

use docrag_core::error::Result;
use docrag_core::traits::{Embedder, Retriever};
use docrag_core::types::{RetrievalResult, SearchMode};

use crate::index::VectorIndex;

/// Embeds the query with the index's embedder and searches the local index.
pub struct LocalRetriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    mode: SearchMode,
}

impl LocalRetriever {
    /// Fails with `EmbedderMismatch` when `embedder` is not the one the index was built with.
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>, mode: SearchMode) -> Result<Self> {
        index.ensure_embedder(embedder.embedder_id())?;
        Ok(Self { index, embedder, mode })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait]
impl Retriever for LocalRetriever {
    fn name(&self) -> &str {
        "vector"
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        self.retrieve_ranked(query, k, self.mode).await
    }

    async fn retrieve_ranked(&self, query: &str, k: usize, mode: SearchMode) -> Result<RetrievalResult> {
        if self.index.is_empty() {
            return Ok(RetrievalResult::default());
        }
        let query_vector = self.embedder.embed_query(query).await?;
        self.index.search(&query_vector, k, mode).await
    }
}
