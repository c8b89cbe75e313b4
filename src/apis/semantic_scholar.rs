use serde::{Deserialize, Serialize};

use super::{truncate_chars, SourceError, SEPARATOR_WIDTH};
use crate::config::Config;

const SERVICE: &str = "Semantic Scholar";
const SIGNUP_URL: &str = "https://www.semanticscholar.org/product/api#api-key-form";
pub const FIELDS: &str = "title,abstract,authors,year,venue,citationCount,externalIds";
pub const DEFAULT_LIMIT: u32 = 50;
const ABSTRACT_PREVIEW_CHARS: usize = 300;

pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S2SearchResponse {
    pub total: Option<u64>,
    pub offset: Option<u64>,
    pub next: Option<u64>,
    #[serde(default)]
    pub data: Vec<S2Paper>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S2Paper {
    pub paper_id: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<S2Author>,
    pub year: Option<u32>,
    pub venue: Option<String>,
    pub citation_count: Option<u64>,
    pub external_ids: Option<S2ExternalIds>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S2Author {
    pub author_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S2ExternalIds {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(rename = "ArXiv")]
    pub arxiv: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.semantic_scholar_url.trim_end_matches('/').to_string(),
            api_key: config.semantic_scholar_api_key.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    /// Keyword search. Returns the response body as JSON, unmodified.
    pub async fn search_raw(&self, query: &str, limit: u32) -> Result<serde_json::Value, SourceError> {
        let url = format!("{}/paper/search", self.base_url);
        let limit = limit.to_string();
        tracing::debug!(%url, query, has_key = self.has_api_key(), "Semantic Scholar search");
        let resp = self
            .add_auth(self.client.get(&url).query(&[
                ("query", query),
                ("limit", limit.as_str()),
                ("fields", FIELDS),
            ]))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited {
                service: SERVICE,
                signup_url: SIGNUP_URL,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<S2SearchResponse, SourceError> {
        let value = self.search_raw(query, limit).await?;
        Ok(serde_json::from_value(value)?)
    }
}

pub fn format_results(resp: &S2SearchResponse) -> String {
    let mut output = format!(
        "Semantic Scholar Search Results: {} of {}\n",
        resp.data.len(),
        resp.total.unwrap_or(resp.data.len() as u64)
    );
    for paper in &resp.data {
        let authors: Vec<&str> = paper.authors.iter().filter_map(|a| a.name.as_deref()).collect();
        let doi = paper.external_ids.as_ref().and_then(|e| e.doi.as_deref());
        output.push_str(&format!("\nTitle: {}\n", paper.title.as_deref().unwrap_or("N/A")));
        output.push_str(&format!(
            "Authors: {}\n",
            if authors.is_empty() { "N/A".to_string() } else { authors.join(", ") }
        ));
        output.push_str(&format!(
            "Year: {}\n",
            paper.year.map(|y| y.to_string()).unwrap_or_else(|| "N/A".into())
        ));
        output.push_str(&format!(
            "Venue: {}\n",
            paper.venue.as_deref().filter(|v| !v.is_empty()).unwrap_or("N/A")
        ));
        output.push_str(&format!(
            "Citations: {}\n",
            paper.citation_count.map(|c| c.to_string()).unwrap_or_else(|| "N/A".into())
        ));
        output.push_str(&format!("DOI: {}\n", doi.unwrap_or("N/A")));
        if let Some(abs) = paper.abstract_text.as_deref() {
            output.push_str(&format!(
                "Abstract: {}...\n",
                truncate_chars(abs, ABSTRACT_PREVIEW_CHARS)
            ));
        }
        output.push_str(&"-".repeat(SEPARATOR_WIDTH));
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_format() {
        let resp: S2SearchResponse = serde_json::from_value(json!({
            "total": 1234,
            "offset": 0,
            "next": 2,
            "data": [
                {
                    "paperId": "abc",
                    "title": "Deep Residual Learning",
                    "abstract": "We present a residual learning framework.",
                    "authors": [{"authorId": "1", "name": "Kaiming He"}, {"authorId": "2", "name": "Xiangyu Zhang"}],
                    "year": 2016,
                    "venue": "CVPR",
                    "citationCount": 150000,
                    "externalIds": {"DOI": "10.1109/CVPR.2016.90", "ArXiv": "1512.03385", "CorpusId": 206594692}
                },
                {"paperId": "def", "title": "Untitled draft", "authors": [], "venue": ""}
            ]
        }))
        .unwrap();

        let text = format_results(&resp);
        assert!(text.starts_with("Semantic Scholar Search Results: 2 of 1234\n"));
        assert!(text.contains("Authors: Kaiming He, Xiangyu Zhang\n"));
        assert!(text.contains("Citations: 150000\n"));
        assert!(text.contains("DOI: 10.1109/CVPR.2016.90\n"));
        assert!(text.contains("Abstract: We present a residual learning framework....\n"));
        assert!(text.contains("Title: Untitled draft\nAuthors: N/A\nYear: N/A\nVenue: N/A\n"));
    }

    #[test]
    fn test_rate_limit_message() {
        let err = SourceError::RateLimited {
            service: SERVICE,
            signup_url: SIGNUP_URL,
        };
        assert_eq!(
            err.to_string(),
            "Semantic Scholar: Rate limit exceeded. Register for an API key at https://www.semanticscholar.org/product/api#api-key-form"
        );
    }
}
