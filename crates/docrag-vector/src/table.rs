//! LanceDB connection, record batch conversion and the index manifest.

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMillisecondArray,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection, Table};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::types::{Chunk, Meta};

use crate::schema::{build_chunks_schema, build_manifest_schema, CHUNKS_TABLE, MANIFEST_TABLE};

const KEY_EMBEDDER_ID: &str = "embedder_id";
const KEY_DIM: &str = "dim";
const KEY_CHUNK_COUNT: &str = "chunk_count";
const KEY_CREATED_AT: &str = "created_at";

pub async fn open_db(path: &Path) -> Result<Connection> {
    connect(path.to_string_lossy().as_ref()).execute().await.map_err(Error::storage)
}

pub async fn table_names(conn: &Connection) -> Result<Vec<String>> {
    conn.table_names().execute().await.map_err(Error::storage)
}

/// Directory LanceDB keeps a local table in.
pub fn table_dir(location: &Path, name: &str) -> PathBuf {
    location.join(format!("{name}.lance"))
}

/// Delete the index tables under `location` and nothing else.
///
/// The manifest goes first: if removal stops halfway the leftover chunk data
/// still reads as an interrupted build. Returns whether anything was removed.
pub fn remove_index_tables(location: &Path) -> Result<bool> {
    let mut removed = false;
    for name in [MANIFEST_TABLE, CHUNKS_TABLE] {
        let dir = table_dir(location, name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            removed = true;
        }
    }
    Ok(removed)
}

/// What a finished build recorded about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub embedder_id: String,
    pub dim: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEY_EMBEDDER_ID, self.embedder_id.clone()),
            (KEY_DIM, self.dim.to_string()),
            (KEY_CHUNK_COUNT, self.chunk_count.to_string()),
            (KEY_CREATED_AT, self.created_at.to_rfc3339()),
        ]
    }

    /// Parse manifest rows; `Err` carries a human-readable reason.
    fn from_pairs(pairs: &BTreeMap<String, String>) -> std::result::Result<Self, String> {
        let get = |key: &str| pairs.get(key).ok_or_else(|| format!("manifest is missing '{key}'"));
        let dim = get(KEY_DIM)?.parse::<usize>().map_err(|e| format!("invalid dim: {e}"))?;
        let chunk_count = get(KEY_CHUNK_COUNT)?
            .parse::<usize>()
            .map_err(|e| format!("invalid chunk_count: {e}"))?;
        let created_at = DateTime::parse_from_rfc3339(get(KEY_CREATED_AT)?)
            .map_err(|e| format!("invalid created_at: {e}"))?
            .with_timezone(&Utc);
        Ok(Self { embedder_id: get(KEY_EMBEDDER_ID)?.clone(), dim, chunk_count, created_at })
    }
}

pub async fn write_manifest(conn: &Connection, manifest: &Manifest) -> Result<()> {
    let pairs = manifest.to_pairs();
    let now = Utc::now().timestamp_millis();
    let schema = build_manifest_schema();
    let rb = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(pairs.iter().map(|(k, _)| *k).collect::<Vec<_>>())),
            Arc::new(StringArray::from(pairs.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>())),
            Arc::new(TimestampMillisecondArray::from(vec![now; pairs.len()])),
        ],
    )
    .map_err(Error::storage)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
    conn.create_table(MANIFEST_TABLE, reader).execute().await.map_err(Error::storage)?;
    Ok(())
}

pub async fn read_manifest(conn: &Connection) -> Result<std::result::Result<Manifest, String>> {
    let table = conn.open_table(MANIFEST_TABLE).execute().await.map_err(Error::storage)?;
    let mut stream = table.query().execute().await.map_err(Error::storage)?;
    let mut pairs = BTreeMap::new();
    while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
        let keys = string_column(&batch, "key")?;
        let values = string_column(&batch, "value")?;
        for i in 0..batch.num_rows() {
            pairs.insert(keys.value(i).to_string(), values.value(i).to_string());
        }
    }
    Ok(Manifest::from_pairs(&pairs))
}

/// Append chunks with their vectors; creates the table on first call.
pub async fn insert_chunks(
    conn: &Connection,
    table_name: &str,
    start_ordinal: usize,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    dim: usize,
) -> Result<()> {
    let batch = chunks_to_record_batch(start_ordinal, chunks, vectors, dim)?;
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    if table_names(conn).await?.iter().any(|n| n == table_name) {
        let table = conn.open_table(table_name).execute().await.map_err(Error::storage)?;
        table.add(reader).execute().await.map_err(Error::storage)?;
    } else {
        conn.create_table(table_name, reader).execute().await.map_err(Error::storage)?;
    }
    Ok(())
}

fn chunks_to_record_batch(start_ordinal: usize, chunks: &[Chunk], vectors: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
    let dim_i32 = i32::try_from(dim).map_err(|_| Error::storage(format!("dimension {dim} too large")))?;
    let mut ids = Vec::with_capacity(chunks.len());
    let mut ordinals = Vec::with_capacity(chunks.len());
    let mut texts = Vec::with_capacity(chunks.len());
    let mut sources = Vec::with_capacity(chunks.len());
    let mut metas = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        ids.push(chunk.id.clone());
        ordinals.push(i32::try_from(start_ordinal + i).map_err(Error::storage)?);
        texts.push(chunk.text.clone());
        sources.push(chunk.source().unwrap_or_default().to_string());
        metas.push(serde_json::to_string(&chunk.metadata).map_err(Error::storage)?);
    }
    let vectors = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    RecordBatch::try_new(
        build_chunks_schema(dim_i32),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(Int32Array::from(ordinals)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(metas)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                vectors, dim_i32,
            )),
        ],
    )
    .map_err(Error::storage)
}

/// One row of a vector search result.
#[derive(Debug, Clone)]
pub struct StoredHit {
    pub chunk: Chunk,
    pub ordinal: usize,
    pub score: f32,
    pub vector: Vec<f32>,
}

/// Decode search output. Cosine `_distance` becomes `1 - distance`.
pub fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<StoredHit>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let metas = string_column(batch, "metadata_json")?;
    let ordinals = batch
        .column_by_name("ordinal")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| Error::storage("column 'ordinal' missing"))?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| Error::storage("column 'vector' missing"))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| Error::storage("column '_distance' missing"))?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let metadata: Meta = serde_json::from_str(metas.value(i)).map_err(Error::storage)?;
        let values = vectors.value(i);
        let vector = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.values().to_vec())
            .ok_or_else(|| Error::storage("vector items are not f32"))?;
        hits.push(StoredHit {
            chunk: Chunk { id: ids.value(i).to_string(), text: texts.value(i).to_string(), metadata },
            ordinal: usize::try_from(ordinals.value(i)).unwrap_or_default(),
            score: 1.0 - distances.value(i),
            vector,
        });
    }
    Ok(hits)
}

pub async fn count_rows(table: &Table) -> Result<usize> {
    table.count_rows(None).await.map_err(Error::storage)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::storage(format!("column '{name}' missing")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_pairs_round_trip() {
        let manifest = Manifest {
            embedder_id: "hash:384".into(),
            dim: 384,
            chunk_count: 7,
            created_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc),
        };
        let pairs: BTreeMap<String, String> =
            manifest.to_pairs().into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        assert_eq!(Manifest::from_pairs(&pairs).unwrap(), manifest);
    }

    #[test]
    fn incomplete_manifest_names_the_missing_key() {
        let mut pairs = BTreeMap::new();
        pairs.insert("embedder_id".to_string(), "hash:384".to_string());
        let reason = Manifest::from_pairs(&pairs).unwrap_err();
        assert!(reason.contains("dim"));
    }

    #[test]
    fn removing_tables_keeps_other_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(table_dir(tmp.path(), CHUNKS_TABLE).join("data")).unwrap();
        fs::create_dir_all(table_dir(tmp.path(), MANIFEST_TABLE)).unwrap();
        fs::write(tmp.path().join(".gitkeep"), "").unwrap();
        fs::write(tmp.path().join("chunks.txt"), "user notes").unwrap();

        assert!(remove_index_tables(tmp.path()).unwrap());
        assert!(!table_dir(tmp.path(), CHUNKS_TABLE).exists());
        assert!(!table_dir(tmp.path(), MANIFEST_TABLE).exists());
        assert!(tmp.path().join(".gitkeep").exists());
        assert!(tmp.path().join("chunks.txt").exists());
        assert!(!remove_index_tables(tmp.path()).unwrap());
    }
}
