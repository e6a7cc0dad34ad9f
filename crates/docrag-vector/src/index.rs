//! The persisted vector index.
//!
//! Layout of a persist location (a LanceDB database directory):
//! - `chunks`: one row per chunk with its text, metadata and vector
//! - `manifest`: key/value rows naming the embedder, dimension and chunk count
//!
//! The manifest is written after every chunk row, so a location holding chunks
//! but no manifest is an interrupted build and is reported as corrupted. A
//! location holding neither table has no index, whatever else it contains;
//! other files in it are never touched.

use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;
use docrag_core::types::{Chunk, RetrievalResult, SearchHit, SearchMode, SourceKind};

use crate::mmr::{mmr_select, MmrCandidate};
use crate::schema::{CHUNKS_TABLE, MANIFEST_TABLE};
use crate::table::{
    count_rows, hits_from_batch, insert_chunks, open_db, read_manifest, remove_index_tables, table_names, write_manifest,
    Manifest, StoredHit,
};

const EMBED_BATCH: usize = 256;
const WRITE_BATCH: usize = 1000;

pub struct VectorIndex {
    persist_location: PathBuf,
    embedder_id: String,
    store: Option<Store>,
}

struct Store {
    table: Table,
    manifest: Manifest,
}

impl VectorIndex {
    /// Embed `chunks` and persist them at `persist_location`, replacing any
    /// previous index there. No chunks gives an empty index and leaves the disk
    /// untouched.
    pub async fn build(chunks: &[Chunk], embedder: &dyn Embedder, persist_location: &Path) -> Result<Self> {
        let embedder_id = embedder.embedder_id().to_string();
        if chunks.is_empty() {
            info!("no chunks to index; returning an empty index");
            return Ok(Self { persist_location: persist_location.to_path_buf(), embedder_id, store: None });
        }

        info!(chunks = chunks.len(), embedder = %embedder_id, location = %persist_location.display(), "building vector index");
        let vectors = embed_with_progress(chunks, embedder).await?;
        let dim = vectors.first().map_or(0, Vec::len);
        if dim == 0 {
            return Err(Error::backend(&embedder_id, "embedder returned empty vectors", false));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
        }

        fs::create_dir_all(persist_location)?;
        if remove_index_tables(persist_location)? {
            debug!(location = %persist_location.display(), "removed previous index tables");
        }

        let conn = open_db(persist_location).await?;
        for (n, (chunk_batch, vector_batch)) in chunks.chunks(WRITE_BATCH).zip(vectors.chunks(WRITE_BATCH)).enumerate() {
            insert_chunks(&conn, CHUNKS_TABLE, n * WRITE_BATCH, chunk_batch, vector_batch, dim).await?;
        }
        let manifest = Manifest {
            embedder_id: embedder_id.clone(),
            dim,
            chunk_count: chunks.len(),
            created_at: chrono::Utc::now(),
        };
        write_manifest(&conn, &manifest).await?;

        let table = conn.open_table(CHUNKS_TABLE).execute().await.map_err(Error::storage)?;
        info!(chunks = chunks.len(), dim, "vector index written");
        Ok(Self { persist_location: persist_location.to_path_buf(), embedder_id, store: Some(Store { table, manifest }) })
    }

    /// Reopen a previously built index without re-embedding anything.
    pub async fn load(persist_location: &Path) -> Result<Self> {
        if !has_entries(persist_location)? {
            return Err(Error::IndexNotFound(persist_location.to_path_buf()));
        }
        let corrupted = |reason: String| Error::IndexCorrupted { path: persist_location.to_path_buf(), reason };

        let conn = open_db(persist_location).await.map_err(|e| corrupted(e.to_string()))?;
        let names = table_names(&conn).await.map_err(|e| corrupted(e.to_string()))?;
        let has_chunks = names.iter().any(|n| n == CHUNKS_TABLE);
        let has_manifest = names.iter().any(|n| n == MANIFEST_TABLE);
        match (has_chunks, has_manifest) {
            (true, true) => {}
            (true, false) => return Err(corrupted("chunk data without a manifest (interrupted build?)".into())),
            (false, true) => return Err(corrupted("manifest without chunk data".into())),
            (false, false) => return Err(Error::IndexNotFound(persist_location.to_path_buf())),
        }

        let manifest = read_manifest(&conn).await.map_err(|e| corrupted(e.to_string()))?.map_err(corrupted)?;
        let table = conn
            .open_table(CHUNKS_TABLE)
            .execute()
            .await
            .map_err(|e| corrupted(e.to_string()))?;
        let rows = count_rows(&table).await.map_err(|e| corrupted(e.to_string()))?;
        if rows != manifest.chunk_count {
            return Err(corrupted(format!("manifest lists {} chunks but {rows} are stored", manifest.chunk_count)));
        }

        info!(location = %persist_location.display(), chunks = rows, embedder = %manifest.embedder_id, "loaded vector index");
        Ok(Self {
            persist_location: persist_location.to_path_buf(),
            embedder_id: manifest.embedder_id.clone(),
            store: Some(Store { table, manifest }),
        })
    }

    /// Remove the index tables at `persist_location`, leaving any other files.
    pub fn clear(persist_location: &Path) -> Result<()> {
        if remove_index_tables(persist_location)? {
            info!(location = %persist_location.display(), "removed vector index");
        }
        Ok(())
    }

    /// Reject an embedder whose vectors would land in a different space.
    pub fn ensure_embedder(&self, embedder_id: &str) -> Result<()> {
        if self.store.is_some() && self.embedder_id != embedder_id {
            return Err(Error::EmbedderMismatch { indexed: self.embedder_id.clone(), configured: embedder_id.to_string() });
        }
        Ok(())
    }

    pub async fn search(&self, query_vector: &[f32], k: usize, mode: SearchMode) -> Result<RetrievalResult> {
        let Some(store) = &self.store else { return Ok(RetrievalResult::default()) };
        if k == 0 {
            return Ok(RetrievalResult::default());
        }
        if query_vector.len() != store.manifest.dim {
            return Err(Error::DimensionMismatch { expected: store.manifest.dim, actual: query_vector.len() });
        }

        let fetch = match mode {
            SearchMode::Similarity => k,
            SearchMode::Mmr { fetch_k, .. } => fetch_k.max(k),
        }
        .min(store.manifest.chunk_count);

        let mut stream = store
            .table
            .vector_search(query_vector.to_vec())
            .map_err(Error::storage)?
            .distance_type(DistanceType::Cosine)
            .bypass_vector_index()
            .limit(fetch)
            .execute()
            .await
            .map_err(Error::storage)?;
        let mut candidates: Vec<StoredHit> = Vec::with_capacity(fetch);
        while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
            candidates.extend(hits_from_batch(&batch)?);
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.ordinal.cmp(&b.ordinal)));

        let ranked: Vec<StoredHit> = match mode {
            SearchMode::Similarity => candidates.into_iter().take(k).collect(),
            SearchMode::Mmr { lambda, .. } => {
                let order = {
                    let mmr: Vec<MmrCandidate<'_>> = candidates
                        .iter()
                        .map(|c| MmrCandidate { relevance: c.score, vector: &c.vector })
                        .collect();
                    mmr_select(&mmr, k, lambda)
                };
                let mut slots: Vec<Option<StoredHit>> = candidates.into_iter().map(Some).collect();
                order.into_iter().filter_map(|i| slots[i].take()).collect()
            }
        };
        debug!(k, fetch, returned = ranked.len(), ?mode, "vector search");

        Ok(RetrievalResult::new(
            ranked
                .into_iter()
                .map(|h| SearchHit { chunk: h.chunk, score: h.score, source: SourceKind::Vector })
                .collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.manifest.chunk_count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.manifest.dim)
    }

    pub fn embedder_id(&self) -> &str {
        &self.embedder_id
    }

    pub fn persist_location(&self) -> &Path {
        &self.persist_location
    }

    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.store.as_ref().map(|s| s.manifest.created_at)
    }
}

/// Whether `path` is a directory with at least one entry.
fn has_entries(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_some())
}

async fn embed_with_progress(chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>> {
    let pb = ProgressBar::new(chunks.len() as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message("embedding");

    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed_documents(&texts).await?;
        if embedded.len() != texts.len() {
            pb.abandon_with_message("embedding failed");
            return Err(Error::backend(
                embedder.embedder_id(),
                format!("expected {} vectors, got {}", texts.len(), embedded.len()),
                false,
            ));
        }
        vectors.extend(embedded);
        pb.inc(batch.len() as u64);
        debug!(done = vectors.len(), total = chunks.len(), "embedded chunks");
    }
    pb.finish_with_message("embedding complete");
    Ok(vectors)
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("persist_location", &self.persist_location)
            .field("embedder_id", &self.embedder_id)
            .field("len", &self.len())
            .finish()
    }
}
