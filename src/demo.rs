//! Fixed walkthrough of the arXiv and CrossRef helpers.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::apis::arxiv::{self, ArxivClient};
use crate::apis::crossref::{self, CrossRefClient};
use crate::config::Config;

pub const DEMO_QUERY: &str = "computer vision";
pub const DEMO_DOI: &str = "10.1038/s41586-019-1666-5";

pub async fn run<W: Write>(config: &Config, download_dir: Option<&Path>, out: &mut W) -> Result<()> {
    let http = config.http_client()?;
    let arxiv_client = ArxivClient::new(http.clone(), config);
    let crossref_client = CrossRefClient::new(http, config);

    writeln!(out, "\nSearch: ArXiv")?;
    match arxiv_client
        .search_feed(DEMO_QUERY, arxiv::DEFAULT_MAX_RESULTS)
        .await
    {
        Ok(feed) => {
            if let Some(dir) = download_dir {
                let report = arxiv_client.download_pdfs(&feed.entries, dir).await?;
                for line in report.lines() {
                    writeln!(out, "{}", line)?;
                }
            }
            writeln!(out, "{}", arxiv_client.format_results(&feed, true))?;
        }
        Err(e) => {
            tracing::warn!("arXiv search failed: {}", e);
            writeln!(out, "{}", e)?;
        }
    }

    writeln!(out, "\nSearch: CrossRef")?;
    match crossref_client.get_work(DEMO_DOI).await {
        Ok(work) => writeln!(out, "{}", crossref::format_work(&work))?,
        Err(e) => {
            tracing::warn!("CrossRef lookup failed: {}", e);
            writeln!(out, "{}", e)?;
            writeln!(out, "{}", crossref::format_work(&crossref::Work::default()))?;
        }
    }
    Ok(())
}
