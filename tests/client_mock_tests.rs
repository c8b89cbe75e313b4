//! Client tests against a wiremock server standing in for the public APIs.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paper_scout::apis::arxiv::ArxivClient;
use paper_scout::apis::crossref::{self, CrossRefClient};
use paper_scout::apis::semantic_scholar::SemanticScholarClient;
use paper_scout::{Config, SourceError};

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: search_query=all:computer vision</title>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <published>2024-01-01T00:00:00Z</published>
    <title>Seeing Is Believing</title>
    <summary>A vision paper.</summary>
    <author><name>Ada Lovelace</name></author>
    <link href="http://arxiv.org/abs/2401.00001v1" rel="alternate" type="text/html"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00002v1</id>
    <published>2024-01-02T00:00:00Z</published>
    <title>Missing PDF</title>
    <summary>Nothing to download.</summary>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2401.00002v1" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

fn clients(server: &MockServer) -> (Config, reqwest::Client) {
    let config = Config::with_base_url(&server.uri());
    let http = config.http_client().unwrap();
    (config, http)
}

#[tokio::test]
async fn test_semantic_scholar_search_sends_key_and_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/search"))
        .and(query_param("query", "graph neural networks"))
        .and(query_param("limit", "50"))
        .and(query_param(
            "fields",
            "title,abstract,authors,year,venue,citationCount,externalIds",
        ))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "offset": 0,
            "data": [{"paperId": "p1", "title": "GNNs", "authors": [{"name": "X"}], "year": 2020}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (mut config, http) = clients(&server);
    config.semantic_scholar_api_key = Some("secret".into());
    let client = SemanticScholarClient::new(http, &config);

    let resp = client.search("graph neural networks", 50).await.unwrap();
    assert_eq!(resp.data.len(), 1);
    assert_eq!(resp.data[0].title.as_deref(), Some("GNNs"));
}

#[tokio::test]
async fn test_semantic_scholar_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/search"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "Too Many Requests"})))
        .mount(&server)
        .await;

    let (config, http) = clients(&server);
    let client = SemanticScholarClient::new(http, &config);
    let err = client.search_raw("anything", 5).await.unwrap_err();

    assert!(matches!(err, SourceError::RateLimited { .. }));
    assert!(err.to_string().contains("Register for an API key"));
}

#[tokio::test]
async fn test_semantic_scholar_server_error_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let (config, http) = clients(&server);
    let client = SemanticScholarClient::new(http, &config);
    let err = client.search_raw("anything", 5).await.unwrap_err();
    assert_eq!(err.to_string(), "Semantic Scholar: Error 500 - upstream down");
}

#[tokio::test]
async fn test_arxiv_search_and_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("search_query", "all:computer vision"))
        .and(query_param("max_results", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pdf/2401.00001v1.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4 fake".to_vec(), "application/pdf"))
        .mount(&server)
        .await;

    let (config, http) = clients(&server);
    let client = ArxivClient::new(http, &config);
    let feed = client.search_feed("computer vision", 5).await.unwrap();
    assert_eq!(feed.entries.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("arxiv_pdfs");
    let report = client.download_pdfs(&feed.entries, &out_dir).await.unwrap();

    assert_eq!(report.saved(), vec![out_dir.join("2401.00001v1.pdf")]);
    assert_eq!(report.failed(), vec!["2401.00002v1"]);
    assert_eq!(
        report.lines(),
        vec![
            format!("Downloaded: {}", out_dir.join("2401.00001v1.pdf").display()),
            "Could not download PDF for 2401.00002v1".to_string(),
        ]
    );
    let saved = std::fs::read(&report.saved()[0]).unwrap();
    assert!(saved.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_arxiv_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let (config, http) = clients(&server);
    let client = ArxivClient::new(http, &config);
    let err = client.search("ti:anything", 5).await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 503, .. }));
    assert_eq!(err.to_string(), "ArXiv: Error 503 - busy");
}

#[tokio::test]
async fn test_crossref_get_work_and_format() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/10.1038/s41586-019-1666-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "message-type": "work",
            "message": {
                "DOI": "10.1038/s41586-019-1666-5",
                "title": ["Quantum supremacy"],
                "container-title": ["Nature"],
                "issued": {"date-parts": [[2019, 10]]},
                "publisher": "Springer",
                "is-referenced-by-count": 10,
                "URL": "http://dx.doi.org/10.1038/s41586-019-1666-5",
                "author": [{"given": "Frank", "family": "Arute"}]
            }
        })))
        .mount(&server)
        .await;

    let (config, http) = clients(&server);
    let client = CrossRefClient::new(http, &config);
    let work = client.get_work("10.1038/s41586-019-1666-5").await.unwrap();
    let text = crossref::format_work(&work);
    assert!(text.contains("Published: 2019-10\n"));
    assert!(text.contains("Authors: Frank Arute\n"));
    assert!(work.reference.is_empty());
}

#[tokio::test]
async fn test_crossref_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/10.0000/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Resource not found."))
        .mount(&server)
        .await;

    let (config, http) = clients(&server);
    let client = CrossRefClient::new(http, &config);
    let err = client.get_references("10.0000/missing").await.unwrap_err();
    assert_eq!(err.to_string(), "CrossRef: Error 404 - Resource not found.");
}

#[tokio::test]
async fn test_crossref_title_search_uses_polite_pool() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("query.title", "nothing matches this"))
        .and(query_param("rows", "1"))
        .and(query_param("mailto", "me@example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "message": {"items": [], "total-results": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (mut config, _) = clients(&server);
    config.crossref_mailto = Some("me@example.org".into());
    let http = config.http_client().unwrap();
    let client = CrossRefClient::new(http, &config);
    assert!(client.search_by_title("nothing matches this").await.unwrap().is_none());
}

#[tokio::test]
async fn test_crossref_doi_with_hash_is_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/10.1002/abc;2-%23"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "message": {"DOI": "10.1002/abc;2-#", "title": ["SICI work"]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (config, http) = clients(&server);
    let client = CrossRefClient::new(http, &config);
    let work = client.get_work("10.1002/abc;2-#").await.unwrap();
    assert_eq!(work.first_title(), Some("SICI work"));
}
