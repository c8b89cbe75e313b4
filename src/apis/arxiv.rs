use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{ensure_success, truncate_chars, SourceError, SEPARATOR_WIDTH};
use crate::config::Config;
use crate::download;

const SERVICE: &str = "ArXiv";
const SUMMARY_PREVIEW_CHARS: usize = 300;
pub const DEFAULT_MAX_RESULTS: u32 = 5;
pub const DEFAULT_OUTPUT_DIR: &str = "arxiv_pdfs";

/// Field prefixes understood by the arXiv query syntax.
const FIELD_PREFIXES: &[&str] = &[
    "ti:", "au:", "abs:", "co:", "jr:", "cat:", "rn:", "id:", "all:",
];

pub struct ArxivClient {
    client: reqwest::Client,
    api_url: String,
    pdf_url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArxivFeed {
    pub title: String,
    pub entries: Vec<ArxivEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArxivEntry {
    /// Full Atom id, e.g. `http://arxiv.org/abs/2301.12345v1`.
    pub id: String,
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: String,
    pub link: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PdfDownload {
    Saved(PathBuf),
    Failed(String),
}

/// Per-entry outcomes of a batch of PDF downloads, in entry order.
/// Failures never abort the batch.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub results: Vec<PdfDownload>,
}

impl DownloadReport {
    pub fn saved(&self) -> Vec<PathBuf> {
        self.results
            .iter()
            .filter_map(|r| match r {
                PdfDownload::Saved(path) => Some(path.clone()),
                PdfDownload::Failed(_) => None,
            })
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| match r {
                PdfDownload::Failed(id) => Some(id.as_str()),
                PdfDownload::Saved(_) => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.results
            .iter()
            .map(|r| match r {
                PdfDownload::Saved(path) => format!("Downloaded: {}", path.display()),
                PdfDownload::Failed(id) => format!("Could not download PDF for {}", id),
            })
            .collect()
    }
}

impl ArxivClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            api_url: config.arxiv_api_url.clone(),
            pdf_url: config.arxiv_pdf_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run a query against the arXiv API and return the raw Atom XML.
    pub async fn search(&self, query: &str, max_results: u32) -> Result<String, SourceError> {
        let search_query = build_search_query(query);
        let max = max_results.to_string();
        tracing::debug!(search_query = %search_query, max_results, "arXiv search");
        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("max_results", max.as_str()),
            ])
            .send()
            .await?;
        let resp = ensure_success(SERVICE, resp).await?;
        Ok(resp.text().await?)
    }

    pub async fn search_feed(&self, query: &str, max_results: u32) -> Result<ArxivFeed, SourceError> {
        let xml = self.search(query, max_results).await?;
        parse_feed(&xml)
    }

    pub fn pdf_url(&self, arxiv_id: &str) -> String {
        format!("{}/{}.pdf", self.pdf_url, arxiv_id)
    }

    pub fn format_results(&self, feed: &ArxivFeed, header: bool) -> String {
        let mut output = String::new();
        if header {
            output.push_str(&format!("ArXiv Search Results: {}\n", feed.title));
        }
        for entry in &feed.entries {
            output.push_str(&format!("\nTitle: {}\n", entry.title));
            output.push_str(&format!("Authors: {}\n", entry.authors.join(", ")));
            output.push_str(&format!("Published: {}\n", entry.published));
            output.push_str(&format!("arXiv Link: {}\n", entry.link));
            output.push_str(&format!("PDF: {}\n", self.pdf_url(&entry.arxiv_id)));
            output.push_str(&format!(
                "Summary: {}...\n",
                truncate_chars(&entry.summary, SUMMARY_PREVIEW_CHARS)
            ));
            output.push_str(&"-".repeat(SEPARATOR_WIDTH));
            output.push('\n');
        }
        output
    }

    /// Save the PDF of every entry into `output_dir`, creating it if needed.
    pub async fn download_pdfs(
        &self,
        entries: &[ArxivEntry],
        output_dir: &Path,
    ) -> Result<DownloadReport, SourceError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let mut report = DownloadReport::default();

        for entry in entries {
            let url = self.pdf_url(&entry.arxiv_id);
            let path = output_dir.join(download::pdf_file_name(&entry.arxiv_id));
            let result = match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    match download::save_response(resp, &path).await {
                        Ok(bytes) => {
                            tracing::info!(path = %path.display(), bytes, "saved arXiv PDF");
                            PdfDownload::Saved(path)
                        }
                        Err(e) => {
                            tracing::warn!(arxiv_id = %entry.arxiv_id, "PDF body download failed: {}", e);
                            PdfDownload::Failed(entry.arxiv_id.clone())
                        }
                    }
                }
                Ok(resp) => {
                    tracing::warn!(arxiv_id = %entry.arxiv_id, status = %resp.status(), "PDF download failed");
                    PdfDownload::Failed(entry.arxiv_id.clone())
                }
                Err(e) => {
                    tracing::warn!(arxiv_id = %entry.arxiv_id, "PDF download failed: {}", e);
                    PdfDownload::Failed(entry.arxiv_id.clone())
                }
            };
            report.results.push(result);
        }
        Ok(report)
    }
}

/// Prefix a bare query with `all:` unless it already names an arXiv field.
pub fn build_search_query(query: &str) -> String {
    let query = query.trim();
    let lower = query.to_ascii_lowercase();
    if FIELD_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        query.to_string()
    } else {
        format!("all:{}", query)
    }
}

/// Text after the last `/abs/` of an Atom id; the id itself when absent.
pub fn arxiv_id_from_url(id: &str) -> &str {
    id.rsplit_once("/abs/").map(|(_, tail)| tail).unwrap_or(id)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn link_attrs(e: &BytesStart<'_>) -> (String, Option<String>) {
    let mut href = String::new();
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let val = String::from_utf8_lossy(&attr.value).to_string();
        match attr.key.as_ref() {
            b"href" => href = val,
            b"rel" => rel = Some(val),
            _ => {}
        }
    }
    (href, rel)
}

#[derive(Default)]
struct EntryBuilder {
    entry: ArxivEntry,
    first_link: String,
    alternate_link: String,
    author_name: String,
    in_author: bool,
}

impl EntryBuilder {
    fn on_link(&mut self, e: &BytesStart<'_>) {
        let (href, rel) = link_attrs(e);
        if self.first_link.is_empty() {
            self.first_link = href.clone();
        }
        if rel.as_deref() == Some("alternate") && self.alternate_link.is_empty() {
            self.alternate_link = href;
        }
    }

    fn finish(mut self) -> ArxivEntry {
        let mut entry = std::mem::take(&mut self.entry);
        entry.title = collapse_whitespace(&entry.title);
        entry.summary = collapse_whitespace(&entry.summary);
        entry.published = entry.published.trim().to_string();
        entry.id = entry.id.trim().to_string();
        entry.arxiv_id = arxiv_id_from_url(&entry.id).to_string();
        entry.link = if self.alternate_link.is_empty() {
            self.first_link
        } else {
            self.alternate_link
        };
        entry
    }
}

/// Parse an arXiv Atom response. An arXiv error entry becomes `SourceError::Api`.
pub fn parse_feed(xml: &str) -> Result<ArxivFeed, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut feed = ArxivFeed::default();
    let mut current: Option<EntryBuilder> = None;
    let mut current_tag = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "entry" {
                    current = Some(EntryBuilder::default());
                } else if let Some(b) = current.as_mut() {
                    if name == "author" {
                        b.in_author = true;
                        b.author_name.clear();
                    } else if name == "link" {
                        b.on_link(&e);
                    }
                }
                current_tag = name;
            }
            Ok(Event::Empty(e)) => {
                if let Some(b) = current.as_mut() {
                    if e.name().as_ref() == b"link" {
                        b.on_link(&e);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| SourceError::Parse(format!("XML text error: {}", err)))?;
                match current.as_mut() {
                    Some(b) => match current_tag.as_str() {
                        "title" => b.entry.title.push_str(&text),
                        "summary" => b.entry.summary.push_str(&text),
                        "id" => b.entry.id.push_str(&text),
                        "published" => b.entry.published.push_str(&text),
                        "name" if b.in_author => b.author_name.push_str(&text),
                        _ => {}
                    },
                    None => {
                        if current_tag == "title" {
                            feed.title.push_str(&text);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let name = name.as_ref();
                if name == b"entry" {
                    if let Some(b) = current.take() {
                        let entry = b.finish();
                        if entry.id.contains("/api/errors") {
                            return Err(SourceError::Api(format!(
                                "arXiv rejected the query: {}",
                                entry.summary
                            )));
                        }
                        if !entry.id.is_empty() {
                            feed.entries.push(entry);
                        }
                    }
                } else if name == b"author" {
                    if let Some(b) = current.as_mut() {
                        b.in_author = false;
                        let author = b.author_name.trim();
                        if !author.is_empty() {
                            b.entry.authors.push(author.to_string());
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    feed.title = collapse_whitespace(&feed.title);
    Ok(feed)
}
