use serde::Deserialize;

use super::{doi_url, ensure_success, SourceError};
use crate::config::Config;

pub struct UnpaywallClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
}

impl UnpaywallClient {
    /// `None` when no contact email is configured; Unpaywall requires one.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Option<Self> {
        config.unpaywall_email.as_ref().map(|email| Self {
            client,
            base_url: config.unpaywall_url.trim_end_matches('/').to_string(),
            email: email.clone(),
        })
    }

    /// Best open-access PDF location for a DOI, if Unpaywall knows one.
    pub async fn get_pdf_url(&self, doi: &str) -> Result<Option<String>, SourceError> {
        let url = doi_url(&self.base_url, doi)?;
        let resp = self
            .client
            .get(url)
            .query(&[("email", self.email.as_str())])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success("Unpaywall", resp).await?;
        let data: UnpaywallResponse = resp.json().await?;
        Ok(data.best_oa_location.and_then(|loc| loc.url_for_pdf))
    }
}

#[derive(Deserialize)]
struct UnpaywallResponse {
    best_oa_location: Option<UnpaywallLocation>,
}

#[derive(Deserialize)]
struct UnpaywallLocation {
    url_for_pdf: Option<String>,
}
