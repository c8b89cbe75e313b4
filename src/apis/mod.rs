pub mod arxiv;
pub mod crossref;
pub mod semantic_scholar;
pub mod unpaywall;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("{service}: Rate limit exceeded. Register for an API key at {signup_url}")]
    RateLimited {
        service: &'static str,
        signup_url: &'static str,
    },
    #[error("{service}: Error {status} - {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turn a non-success response into `SourceError::Status`, keeping the body.
pub(crate) async fn ensure_success(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Append a DOI to `base` as path segments, percent-encoding each one.
/// The DOI's own `/` separators are kept.
pub(crate) fn doi_url(base: &str, doi: &str) -> Result<reqwest::Url, SourceError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| SourceError::Parse(format!("bad base URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| SourceError::Parse(format!("base URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .extend(doi.trim().split('/'));
    Ok(url)
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub(crate) const SEPARATOR_WIDTH: usize = 80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_status_message_format() {
        let err = SourceError::Status {
            service: "CrossRef",
            status: 404,
            body: "Resource not found.".into(),
        };
        assert_eq!(err.to_string(), "CrossRef: Error 404 - Resource not found.");
    }

    #[test]
    fn test_doi_url_encodes_sici_characters() {
        let doi = "10.1002/(SICI)1099-1573(199612)10:8<694::AID-PTR1>3.0.CO;2-#";
        let url = doi_url("https://api.crossref.org/works", doi).unwrap();
        assert_eq!(url.fragment(), None);
        assert!(url.path().starts_with("/works/10.1002/(SICI)1099-1573(199612)10:8"));
        assert!(url.path().ends_with("%3E3.0.CO;2-%23"));
        assert!(url.path().contains("%3C694"));

        let url = doi_url("https://doi.org/", "10.1038/s41586-019-1666-5").unwrap();
        assert_eq!(url.as_str(), "https://doi.org/10.1038/s41586-019-1666-5");
    }
}
