//! Domain types shared by the loader, chunker, indexes and retrievers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// Uniform representation of one loaded source file (or one part of it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Meta,
    pub source_path: String,
}

/// A bounded text segment of a [`Document`]; the unit of embedding and retrieval.
///
/// - `id`: `<source_path>:<chunk_index>`
/// - `metadata`: the document metadata plus `chunk_index`, `total_chunks`
///   and `start_index` (character offset in the document text)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// Indicates which retriever produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Remote,
}

/// One ranked chunk. `score` is retriever-specific but higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SourceKind,
}

/// Hits for one query, most relevant first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<SearchHit>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.hits.iter().map(|h| &h.chunk)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.chunk.id.as_str()).collect()
    }
}

/// Ranking applied by a vector search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// Cosine similarity, closest first.
    Similarity,
    /// Maximal marginal relevance over the top `fetch_k` similarity candidates.
    /// `lambda` = 1.0 is pure relevance, 0.0 pure diversity.
    Mmr { lambda: f32, fetch_k: usize },
}

impl SearchMode {
    pub fn mmr() -> Self {
        Self::Mmr { lambda: 0.5, fetch_k: 20 }
    }
}
