use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docrag_core::config::{ContentType, HttpSettings, RemoteSearchSettings};
use docrag_core::error::Error;
use docrag_core::traits::Retriever;
use docrag_core::types::SourceKind;
use docrag_remote::RemoteRetriever;

const SEARCH_PATH: &str = "/projects/acme/locations/global/collections/default_collection/dataStores/handbook/servingConfigs/default_search:search";

fn settings(server: &MockServer, content_type: ContentType) -> RemoteSearchSettings {
    RemoteSearchSettings {
        endpoint: server.uri(),
        project_id: Some("acme".into()),
        data_store_id: Some("handbook".into()),
        access_token: Some("ya29.token".into()),
        content_type,
        ..RemoteSearchSettings::default()
    }
}

fn http() -> HttpSettings {
    HttpSettings { timeout_secs: 5, max_retries: 1, initial_backoff_ms: 1, max_backoff_ms: 1 }
}

#[tokio::test]
async fn unstructured_results_use_extractive_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(header("authorization", "Bearer ya29.token"))
        .and(body_partial_json(json!({ "query": "vacation policy", "pageSize": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "id": "doc-1",
                    "document": {
                        "name": "projects/acme/.../documents/doc-1",
                        "id": "doc-1",
                        "derivedStructData": {
                            "link": "gs://bucket/handbook.pdf",
                            "title": "Handbook",
                            "extractive_answers": [{ "content": "Employees get 15 days of paid leave", "pageNumber": "3" }]
                        }
                    }
                },
                {
                    "id": "doc-2",
                    "document": {
                        "id": "doc-2",
                        "derivedStructData": {
                            "extractive_segments": [{ "content": "Leave requests go to HR" }]
                        }
                    }
                }
            ],
            "totalSize": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let retriever = RemoteRetriever::new(&settings(&server, ContentType::Unstructured), &http()).unwrap();
    let result = retriever.retrieve("vacation policy", 2).await.unwrap();

    assert_eq!(result.ids(), vec!["doc-1", "doc-2"]);
    let top = &result.hits[0];
    assert_eq!(top.chunk.text, "Employees get 15 days of paid leave");
    assert_eq!(top.chunk.metadata["source"], "gs://bucket/handbook.pdf");
    assert_eq!(top.source, SourceKind::Remote);
    assert!((top.score - 1.0).abs() < 1e-6);
    assert!((result.hits[1].score - 0.5).abs() < 1e-6);
    assert_eq!(result.hits[1].chunk.text, "Leave requests go to HR");
}

#[tokio::test]
async fn website_results_use_snippets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({ "contentSearchSpec": { "snippetSpec": { "returnSnippet": true } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "page-1",
                "document": {
                    "derivedStructData": {
                        "link": "https://intranet.example/leave",
                        "snippets": [{ "snippet": "15 days of paid leave", "snippet_status": "SUCCESS" }]
                    }
                },
                "modelScores": { "relevance_score": { "values": [0.42] } }
            }]
        })))
        .mount(&server)
        .await;

    let retriever = RemoteRetriever::new(&settings(&server, ContentType::Website), &http()).unwrap();
    let result = retriever.retrieve("leave", 5).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.hits[0].chunk.id, "page-1");
    assert_eq!(result.hits[0].chunk.text, "15 days of paid leave");
    assert!((result.hits[0].score - 0.42).abs() < 1e-6);
}

#[tokio::test]
async fn structured_results_serialise_struct_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "row-1", "document": { "id": "row-1", "structData": { "policy": "vacation", "days": 15 } } },
                { "id": "row-2", "document": { "id": "row-2" } }
            ]
        })))
        .mount(&server)
        .await;

    let retriever = RemoteRetriever::new(&settings(&server, ContentType::Structured), &http()).unwrap();
    let result = retriever.retrieve("vacation", 5).await.unwrap();

    assert_eq!(result.ids(), vec!["row-1"], "documents without data are skipped");
    assert!(result.hits[0].chunk.text.contains("\"days\":15"));
}

#[tokio::test]
async fn service_errors_surface_as_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let retriever = RemoteRetriever::new(&settings(&server, ContentType::Unstructured), &http()).unwrap();
    let err = retriever.retrieve("anything", 3).await.unwrap_err();
    assert!(matches!(err, Error::Backend { retryable: false, .. }));
}

#[test]
fn missing_configuration_is_rejected_up_front() {
    let base = RemoteSearchSettings {
        project_id: Some("acme".into()),
        data_store_id: Some("handbook".into()),
        access_token: Some("token".into()),
        ..RemoteSearchSettings::default()
    };
    assert!(RemoteRetriever::new(&base, &http()).is_ok());

    for broken in [
        RemoteSearchSettings { data_store_id: None, ..base.clone() },
        RemoteSearchSettings { project_id: Some("  ".into()), ..base.clone() },
        RemoteSearchSettings { access_token: None, ..base.clone() },
    ] {
        match RemoteRetriever::new(&broken, &http()) {
            Err(Error::InvalidConfig(msg)) => assert!(msg.starts_with("remote_search.")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("accepted incomplete configuration"),
        }
    }
}
