use serde::{Deserialize, Serialize};

use super::{doi_url, ensure_success, SourceError};
use crate::config::Config;

const SERVICE: &str = "CrossRef";
const NOT_AVAILABLE: &str = "N/A";

pub struct CrossRefClient {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
}

#[derive(Deserialize)]
struct CREnvelope<T> {
    message: T,
}

#[derive(Deserialize)]
struct CRItemList {
    #[serde(default)]
    items: Vec<Work>,
}

/// A CrossRef work record (the `message` of `/works/{doi}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Work {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub container_title: Vec<String>,
    pub issued: Option<CRDate>,
    pub publisher: Option<String>,
    pub is_referenced_by_count: Option<u64>,
    #[serde(rename = "URL")]
    pub url: Option<String>,
    #[serde(default)]
    pub author: Vec<CRAuthor>,
    #[serde(default)]
    pub reference: Vec<Reference>,
}

impl Work {
    pub fn first_title(&self) -> Option<&str> {
        self.title.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CRDate {
    #[serde(rename = "date-parts", default)]
    pub date_parts: Vec<Vec<Option<i64>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CRAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
    /// Organisational authors carry only a name.
    pub name: Option<String>,
}

impl CRAuthor {
    pub fn display_name(&self) -> String {
        let joined = format!(
            "{} {}",
            self.given.as_deref().unwrap_or(""),
            self.family.as_deref().unwrap_or("")
        );
        let joined = joined.trim();
        match (joined.is_empty(), self.name.as_deref()) {
            (true, Some(name)) => name.to_string(),
            _ => joined.to_string(),
        }
    }
}

/// One entry of a work's `reference` list. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Reference {
    pub key: Option<String>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    pub article_title: Option<String>,
    pub series_title: Option<String>,
    pub volume_title: Option<String>,
    pub journal_title: Option<String>,
    pub author: Option<String>,
    pub year: Option<String>,
    pub unstructured: Option<String>,
}

impl Reference {
    pub fn title(&self) -> Option<&str> {
        [&self.article_title, &self.series_title, &self.volume_title]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|t| !t.is_empty())
    }
}

impl CrossRefClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.crossref_url.trim_end_matches('/').to_string(),
            mailto: config.crossref_mailto.clone(),
        }
    }

    fn polite(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.mailto {
            Some(email) => req.query(&[("mailto", email.as_str())]),
            None => req,
        }
    }

    /// Look up the metadata of a single work by DOI.
    pub async fn get_work(&self, doi: &str) -> Result<Work, SourceError> {
        let url = doi_url(&format!("{}/works", self.base_url), doi)?;
        tracing::debug!(%url, "CrossRef work lookup");
        let resp = self.polite(self.client.get(url)).send().await?;
        let resp = ensure_success(SERVICE, resp).await?;
        let envelope: CREnvelope<Work> = resp.json().await?;
        Ok(envelope.message)
    }

    /// Best CrossRef match for a title, if any.
    pub async fn search_by_title(&self, title: &str) -> Result<Option<Work>, SourceError> {
        let url = format!("{}/works", self.base_url);
        tracing::debug!(%url, title, "CrossRef title search");
        let resp = self
            .polite(
                self.client
                    .get(&url)
                    .query(&[("query.title", title), ("rows", "1")]),
            )
            .send()
            .await?;
        let resp = ensure_success(SERVICE, resp).await?;
        let envelope: CREnvelope<CRItemList> = resp.json().await?;
        Ok(envelope.message.items.into_iter().next())
    }

    /// The reference list deposited for a DOI; empty when none was deposited.
    pub async fn get_references(&self, doi: &str) -> Result<Vec<Reference>, SourceError> {
        Ok(self.get_work(doi).await?.reference)
    }
}

pub fn format_work(work: &Work) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Title: {}\n",
        work.first_title().unwrap_or(NOT_AVAILABLE)
    ));
    output.push_str(&format!(
        "Journal: {}\n",
        work.container_title.first().map(String::as_str).unwrap_or(NOT_AVAILABLE)
    ));
    output.push_str(&format!("Published: {}\n", format_date(work.issued.as_ref())));
    output.push_str(&format!("DOI: {}\n", work.doi.as_deref().unwrap_or("")));
    output.push_str(&format!(
        "Publisher: {}\n",
        work.publisher.as_deref().unwrap_or(NOT_AVAILABLE)
    ));
    output.push_str(&format!(
        "Citation Count: {}\n",
        work.is_referenced_by_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    ));
    output.push_str(&format!("URL: {}\n", work.url.as_deref().unwrap_or("")));
    if work.author.is_empty() {
        output.push_str("Authors: N/A\n");
    } else {
        let names: Vec<String> = work.author.iter().map(CRAuthor::display_name).collect();
        output.push_str(&format!("Authors: {}\n", names.join(", ")));
    }
    output
}

/// `issued.date-parts[0]` joined with `-`; null parts are skipped.
fn format_date(date: Option<&CRDate>) -> String {
    let parts: Vec<String> = date
        .and_then(|d| d.date_parts.first())
        .map(|p| p.iter().flatten().map(|x| x.to_string()).collect())
        .unwrap_or_default();
    if parts.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        parts.join("-")
    }
}

pub fn format_reference(reference: &Reference) -> String {
    format!(
        "Title: {}\nAuthor: {}\nYear: {}\nDOI: {}\n",
        reference.title().unwrap_or(NOT_AVAILABLE),
        reference.author.as_deref().unwrap_or(NOT_AVAILABLE),
        reference.year.as_deref().unwrap_or(NOT_AVAILABLE),
        reference.doi.as_deref().unwrap_or(NOT_AVAILABLE),
    )
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in `[0, 1]` between two titles after case and punctuation folding.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_title(a), &normalize_title(b))
}
