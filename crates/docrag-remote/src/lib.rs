//! Retrieval delegated to Vertex AI Search (Discovery Engine).
//!
//! The service owns ingestion, embedding and ranking; this crate only turns a
//! `:search` response into ranked chunks. Nothing is persisted locally.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use docrag_core::config::{ContentType, HttpSettings, RemoteSearchSettings};
use docrag_core::error::{Error, Result};
use docrag_core::traits::Retriever;
use docrag_core::types::{Chunk, Meta, RetrievalResult, SearchHit, SourceKind};
use docrag_provider::http::HttpBackend;

pub struct RemoteRetriever {
    http: HttpBackend,
    url: String,
    access_token: String,
    content_type: ContentType,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    id: String,
    #[serde(default)]
    document: SearchDocument,
    #[serde(default)]
    model_scores: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchDocument {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    derived_struct_data: Map<String, Value>,
    #[serde(default)]
    struct_data: Option<Value>,
}

impl RemoteRetriever {
    /// Validates the configuration up front; no request is made here.
    pub fn new(settings: &RemoteSearchSettings, http: &HttpSettings) -> Result<Self> {
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::InvalidConfig(format!("remote_search.{key} is required")))
        };
        let data_store = required(&settings.data_store_id, "data_store_id")?;
        let project = required(&settings.project_id, "project_id")?;
        let access_token = required(&settings.access_token, "access_token")?;

        let url = format!(
            "{}/projects/{project}/locations/{}/collections/default_collection/dataStores/{data_store}/servingConfigs/{}:search",
            settings.endpoint.trim_end_matches('/'),
            settings.location,
            settings.serving_config,
        );
        info!(data_store = %data_store, content_type = ?settings.content_type, "remote search configured");
        Ok(Self { http: HttpBackend::new("remote-search", http)?, url, access_token, content_type: settings.content_type })
    }

    fn request_body(&self, query: &str, k: usize) -> Value {
        let mut body = json!({ "query": query, "pageSize": k });
        let spec = match self.content_type {
            ContentType::Unstructured => Some(json!({
                "extractiveContentSpec": { "maxExtractiveAnswerCount": 1, "maxExtractiveSegmentCount": 1 }
            })),
            ContentType::Website => Some(json!({ "snippetSpec": { "returnSnippet": true } })),
            ContentType::Structured => None,
        };
        if let (Some(spec), Some(obj)) = (spec, body.as_object_mut()) {
            obj.insert("contentSearchSpec".to_string(), spec);
        }
        body
    }

    fn to_hit(&self, rank: usize, result: SearchResult) -> Option<SearchHit> {
        let doc = result.document;
        let derived = &doc.derived_struct_data;
        let text = match self.content_type {
            ContentType::Unstructured => {
                let answers = join_field(derived, "extractive_answers", "content");
                if answers.is_empty() { join_field(derived, "extractive_segments", "content") } else { answers }
            }
            ContentType::Structured => doc
                .struct_data
                .as_ref()
                .map(|v| serde_json::to_string(v).unwrap_or_default())
                .unwrap_or_default(),
            ContentType::Website => join_field(derived, "snippets", "snippet"),
        };
        if text.trim().is_empty() {
            debug!(rank, id = %result.id, "result has no extractable text, skipping");
            return None;
        }

        let id = if doc.id.is_empty() { result.id } else { doc.id };
        let mut metadata = Meta::new();
        let source = derived.get("link").and_then(Value::as_str).map_or_else(|| doc.name.clone(), str::to_string);
        metadata.insert("source".into(), source);
        if let Some(title) = derived.get("title").and_then(Value::as_str) {
            metadata.insert("title".into(), title.to_string());
        }
        metadata.insert("document_id".into(), id.clone());
        metadata.insert("rank".into(), rank.to_string());

        let score = result.model_scores.as_ref().and_then(relevance_score).unwrap_or(1.0 / (rank as f32 + 1.0));
        Some(SearchHit { chunk: Chunk { id, text, metadata }, score, source: SourceKind::Remote })
    }
}

#[async_trait]
impl Retriever for RemoteRetriever {
    fn name(&self) -> &str {
        "remote"
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::default());
        }
        let body = self.request_body(query, k);
        let response: SearchResponse = self.http.post_json(&self.url, Some(&self.access_token), &body).await?;
        let hits: Vec<SearchHit> = response
            .results
            .into_iter()
            .enumerate()
            .filter_map(|(rank, r)| self.to_hit(rank, r))
            .take(k)
            .collect();
        debug!(k, returned = hits.len(), "remote search");
        Ok(RetrievalResult::new(hits))
    }
}

fn join_field(data: &Map<String, Value>, list: &str, field: &str) -> String {
    data.get(list)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field).and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// `modelScores.relevance_score.values[0]`, when the service returned one.
fn relevance_score(scores: &Value) -> Option<f32> {
    let value = scores.get("relevance_score")?.get("values")?.get(0)?.as_f64()?;
    Some(value as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_service_relevance_score() {
        let scores = json!({ "relevance_score": { "values": [0.75] } });
        assert_eq!(relevance_score(&scores), Some(0.75));
        assert_eq!(relevance_score(&json!({})), None);
    }

    #[test]
    fn joins_extractive_answers() {
        let data = json!({ "extractive_answers": [{ "content": "a" }, { "content": "b" }] });
        let map = data.as_object().unwrap();
        assert_eq!(join_field(map, "extractive_answers", "content"), "a\nb");
        assert_eq!(join_field(map, "snippets", "snippet"), "");
    }
}
