use std::path::PathBuf;
use std::time::Duration;

use crate::apis::SourceError;

pub const SEMANTIC_SCHOLAR_URL: &str = "https://api.semanticscholar.org/graph/v1";
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
pub const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";
pub const CROSSREF_URL: &str = "https://api.crossref.org";
pub const DOI_RESOLVER_URL: &str = "https://doi.org";
pub const UNPAYWALL_URL: &str = "https://api.unpaywall.org/v2";
pub const HUGGINGFACE_URL: &str = "https://huggingface.co";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runtime configuration, loaded from environment variables and then
/// overridden by command-line flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub semantic_scholar_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
    pub unpaywall_email: Option<String>,
    pub hf_token: Option<String>,
    pub model_dir: PathBuf,
    pub timeout: Duration,

    pub semantic_scholar_url: String,
    pub arxiv_api_url: String,
    pub arxiv_pdf_url: String,
    pub crossref_url: String,
    pub doi_resolver_url: String,
    pub unpaywall_url: String,
    pub huggingface_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            semantic_scholar_api_key: None,
            crossref_mailto: None,
            unpaywall_email: None,
            hf_token: None,
            model_dir: home_or_default().join(".paper-scout").join("models"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            semantic_scholar_url: SEMANTIC_SCHOLAR_URL.to_string(),
            arxiv_api_url: ARXIV_API_URL.to_string(),
            arxiv_pdf_url: ARXIV_PDF_URL.to_string(),
            crossref_url: CROSSREF_URL.to_string(),
            doi_resolver_url: DOI_RESOLVER_URL.to_string(),
            unpaywall_url: UNPAYWALL_URL.to_string(),
            huggingface_url: HUGGINGFACE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let model_dir = std::env::var("PAPER_SCOUT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir);

        let timeout = std::env::var("PAPER_SCOUT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            semantic_scholar_api_key: non_empty_env("SEMANTIC_SCHOLAR_API_KEY"),
            crossref_mailto: non_empty_env("CROSSREF_MAILTO"),
            unpaywall_email: non_empty_env("UNPAYWALL_EMAIL"),
            hf_token: non_empty_env("HF_TOKEN"),
            model_dir,
            timeout,
            ..defaults
        }
    }

    /// Point every endpoint at a single base URL (a local mock server).
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            semantic_scholar_url: format!("{}/graph/v1", base),
            arxiv_api_url: format!("{}/api/query", base),
            arxiv_pdf_url: format!("{}/pdf", base),
            crossref_url: base.to_string(),
            doi_resolver_url: format!("{}/doi", base),
            unpaywall_url: format!("{}/unpaywall/v2", base),
            huggingface_url: format!("{}/hf", base),
            timeout: Duration::from_secs(10),
            ..Self::default()
        }
    }

    pub fn user_agent(&self) -> String {
        match self.crossref_mailto {
            Some(ref email) => format!(
                "paper-scout/{} (mailto:{})",
                env!("CARGO_PKG_VERSION"),
                email
            ),
            None => format!("paper-scout/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Build the shared HTTP client. Redirects are followed (reqwest default).
    pub fn http_client(&self) -> Result<reqwest::Client, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent())
            .timeout(self.timeout)
            .build()?;
        Ok(client)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn home_or_default() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
