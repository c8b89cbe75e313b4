//! Follow a paper's references: title → DOI → main PDF → reference list →
//! per-reference arXiv lookups. Every step runs sequentially.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::apis::arxiv::{self, ArxivClient};
use crate::apis::crossref::{self, CrossRefClient};
use crate::apis::unpaywall::UnpaywallClient;
use crate::apis::{doi_url, SourceError};
use crate::config::Config;
use crate::download;

pub const DEFAULT_MAIN_DIR: &str = "main_paper";

/// Below this, the CrossRef hit is reported as a loose match.
const LOOSE_MATCH_SIMILARITY: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct FollowOptions {
    pub download: bool,
    pub main_dir: PathBuf,
    pub max_references: Option<usize>,
    pub arxiv_lookups: bool,
    pub arxiv_results: u32,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            download: true,
            main_dir: PathBuf::from(DEFAULT_MAIN_DIR),
            max_references: None,
            arxiv_lookups: true,
            arxiv_results: arxiv::DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FollowOutcome {
    NoMatch,
    NoDoi,
    NoReferences { doi: String },
    Completed { doi: String, references: usize },
}

/// Where the main paper's PDF came from, if anywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum MainPdf {
    FromDoi(PathBuf),
    FromLandingPage(PathBuf),
    FromUnpaywall(PathBuf),
    FromArxiv(Vec<PathBuf>),
    NotFound,
}

pub struct ReferenceFollower {
    http: reqwest::Client,
    crossref: CrossRefClient,
    arxiv: ArxivClient,
    unpaywall: Option<UnpaywallClient>,
    doi_resolver_url: String,
}

impl ReferenceFollower {
    pub fn new(config: &Config) -> Result<Self, SourceError> {
        let http = config.http_client()?;
        Ok(Self {
            crossref: CrossRefClient::new(http.clone(), config),
            arxiv: ArxivClient::new(http.clone(), config),
            unpaywall: UnpaywallClient::from_config(http.clone(), config),
            doi_resolver_url: config.doi_resolver_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn run<W: Write>(
        &self,
        query_title: &str,
        opts: &FollowOptions,
        out: &mut W,
    ) -> Result<FollowOutcome> {
        writeln!(out, "\nSearching CrossRef for paper...")?;
        let work = match self.crossref.search_by_title(query_title).await {
            Ok(Some(work)) => work,
            Ok(None) => {
                writeln!(out, "No paper found with that title.")?;
                return Ok(FollowOutcome::NoMatch);
            }
            Err(e) => {
                tracing::warn!("CrossRef title search failed: {}", e);
                writeln!(out, "{}", e)?;
                writeln!(out, "No paper found with that title.")?;
                return Ok(FollowOutcome::NoMatch);
            }
        };

        let Some(doi) = work.doi.clone().filter(|d| !d.is_empty()) else {
            writeln!(out, "No DOI found for this paper.")?;
            return Ok(FollowOutcome::NoDoi);
        };
        let title = work.first_title().unwrap_or("N/A").to_string();

        let similarity = crossref::title_similarity(query_title, &title);
        if similarity < LOOSE_MATCH_SIMILARITY {
            tracing::warn!(similarity, found = %title, "closest CrossRef match differs from the query");
        }

        writeln!(out, "\nFound paper: {}", title)?;
        writeln!(out, "DOI: {}", doi)?;

        if opts.download {
            writeln!(out, "\nDownloading main paper PDF...")?;
            match self
                .download_main_pdf(&doi, &title, &opts.main_dir, out)
                .await
            {
                Ok(main) => tracing::info!(?main, "main paper download finished"),
                Err(e) => {
                    tracing::warn!("main paper download failed: {:#}", e);
                    writeln!(out, "Could not download main paper PDF: {:#}", e)?;
                }
            }
        }

        writeln!(out, "\nExtracting references from this paper...")?;
        let refs = match self.crossref.get_references(&doi).await {
            Ok(refs) => refs,
            Err(e) => {
                tracing::warn!("CrossRef reference lookup failed: {}", e);
                writeln!(out, "{}", e)?;
                Vec::new()
            }
        };
        if refs.is_empty() {
            writeln!(out, "No references found.")?;
            return Ok(FollowOutcome::NoReferences { doi });
        }

        writeln!(out, "\nFound {} references.\n{}", refs.len(), "=".repeat(80))?;
        let limit = opts.max_references.unwrap_or(refs.len());
        for (i, reference) in refs.iter().take(limit).enumerate() {
            writeln!(
                out,
                "\nReference {}:\n{}",
                i + 1,
                crossref::format_reference(reference)
            )?;

            if !opts.arxiv_lookups {
                continue;
            }
            let Some(ref_doi) = reference.doi.as_deref() else {
                continue;
            };
            match self.arxiv.search_feed(ref_doi, opts.arxiv_results).await {
                Ok(feed) if !feed.entries.is_empty() => {
                    writeln!(out, "{}", self.arxiv.format_results(&feed, false))?;
                }
                Ok(_) => tracing::debug!(doi = ref_doi, "no arXiv match for reference"),
                Err(e) => {
                    tracing::warn!(doi = ref_doi, "arXiv lookup failed: {}", e);
                    writeln!(out, "{}", e)?;
                }
            }
        }

        Ok(FollowOutcome::Completed {
            doi,
            references: refs.len(),
        })
    }

    /// Try, in order: the DOI resolver, the landing page's `citation_pdf_url`,
    /// Unpaywall, then an arXiv title search. Transport errors fall through.
    pub async fn download_main_pdf<W: Write>(
        &self,
        doi: &str,
        title: &str,
        output_dir: &Path,
        out: &mut W,
    ) -> Result<MainPdf> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        let target = output_dir.join(download::title_file_name(title));

        match self.via_doi(doi, &target).await {
            Ok(Some(found)) => {
                writeln!(out, "Downloaded main paper PDF: {}", target.display())?;
                return Ok(found);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("DOI download failed: {}", e),
        }

        if let Some(unpaywall) = &self.unpaywall {
            match unpaywall.get_pdf_url(doi).await {
                Ok(Some(url)) => match self.fetch_pdf(&url, &target).await {
                    Ok(true) => {
                        writeln!(out, "Downloaded main paper PDF: {}", target.display())?;
                        return Ok(MainPdf::FromUnpaywall(target));
                    }
                    Ok(false) => tracing::debug!(%url, "Unpaywall location was not a PDF"),
                    Err(e) => tracing::debug!(%url, "Unpaywall PDF fetch failed: {}", e),
                },
                Ok(None) => tracing::debug!(doi, "no open-access location on Unpaywall"),
                Err(e) => tracing::warn!("Unpaywall lookup failed: {}", e),
            }
        }

        writeln!(out, "Could not download from DOI. Trying ArXiv...")?;
        let feed = match self.arxiv.search_feed(title, arxiv::DEFAULT_MAX_RESULTS).await {
            Ok(feed) => feed,
            Err(e) => {
                writeln!(out, "{}", e)?;
                writeln!(out, "Could not find main paper on ArXiv.")?;
                return Ok(MainPdf::NotFound);
            }
        };
        if feed.entries.is_empty() {
            writeln!(out, "Could not find main paper on ArXiv.")?;
            return Ok(MainPdf::NotFound);
        }

        let report = self.arxiv.download_pdfs(&feed.entries, output_dir).await?;
        for line in report.lines() {
            writeln!(out, "{}", line)?;
        }
        let saved = report.saved();
        if saved.is_empty() {
            Ok(MainPdf::NotFound)
        } else {
            Ok(MainPdf::FromArxiv(saved))
        }
    }

    async fn via_doi(&self, doi: &str, target: &Path) -> Result<Option<MainPdf>, SourceError> {
        let url = doi_url(&self.doi_resolver_url, doi)?;
        let resp = self.http.get(url).send().await?;
        if download::is_pdf(&resp) {
            download::save_response(resp, target).await?;
            return Ok(Some(MainPdf::FromDoi(target.to_path_buf())));
        }
        if !resp.status().is_success() || !download::content_type(&resp).contains("html") {
            return Ok(None);
        }

        let landing = resp.url().clone();
        let html = resp.text().await?;
        let Some(pdf_href) = download::citation_pdf_url(&html) else {
            return Ok(None);
        };
        let pdf_url = landing
            .join(&pdf_href)
            .map_err(|e| SourceError::Parse(format!("bad citation_pdf_url {}: {}", pdf_href, e)))?;
        if self.fetch_pdf(pdf_url.as_str(), target).await? {
            Ok(Some(MainPdf::FromLandingPage(target.to_path_buf())))
        } else {
            Ok(None)
        }
    }

    /// Fetch `url` and save it only if the server says it is a PDF.
    async fn fetch_pdf(&self, url: &str, target: &Path) -> Result<bool, SourceError> {
        let resp = self.http.get(url).send().await?;
        if resp.status().is_success() && download::is_pdf(&resp) {
            download::save_response(resp, target).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Read a title from stdin after printing the prompt.
pub fn prompt_title() -> Result<String> {
    print!("Enter the paper title: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read title from stdin")?;
    Ok(line.trim().to_string())
}
