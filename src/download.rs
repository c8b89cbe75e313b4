//! Helpers for writing fetched documents to disk.

use std::path::Path;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use tokio::io::AsyncWriteExt;

use crate::apis::{truncate_chars, SourceError};

/// File name for a PDF derived from an identifier or title.
pub fn pdf_file_name(stem: &str) -> String {
    format!("{}.pdf", stem.replace('/', "_"))
}

/// File name for a main paper, using at most the first 50 characters of its title.
pub fn title_file_name(title: &str) -> String {
    pdf_file_name(truncate_chars(title, 50))
}

pub fn content_type(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

pub fn is_pdf(resp: &reqwest::Response) -> bool {
    content_type(resp).contains("pdf")
}

/// Stream a response body into `path`, returning the number of bytes written.
/// A body that fails midway leaves no file behind.
pub async fn save_response(resp: reqwest::Response, path: &Path) -> Result<u64, SourceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let file = tokio::fs::File::create(path).await?;
    match write_body(resp, file).await {
        Ok(written) => Ok(written),
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), "could not remove partial download: {}", rm);
            }
            Err(e)
        }
    }
}

async fn write_body(resp: reqwest::Response, mut file: tokio::fs::File) -> Result<u64, SourceError> {
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Extract `<meta name="citation_pdf_url">` from a publisher landing page.
pub fn citation_pdf_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="citation_pdf_url"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}
