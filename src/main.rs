use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use paper_scout::apis::arxiv::{self, ArxivClient};
use paper_scout::apis::crossref::{self, CrossRefClient};
use paper_scout::apis::semantic_scholar::{self, SemanticScholarClient};
use paper_scout::generate::{self, GenerationConfig, ModelSource};
use paper_scout::references::{self, FollowOptions, ReferenceFollower};
use paper_scout::{demo, Config};

#[derive(Parser, Debug)]
#[command(name = "paper-scout")]
#[command(about = "Query Semantic Scholar, arXiv and CrossRef; follow references; run a local LM")]
#[command(version)]
struct Cli {
    /// Log filter (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Request timeout in seconds
    #[arg(long, env = "PAPER_SCOUT_TIMEOUT_SECS", global = true)]
    timeout: Option<u64>,

    /// Contact email for the CrossRef polite pool
    #[arg(long, env = "CROSSREF_MAILTO", global = true)]
    mailto: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keyword search on Semantic Scholar
    SemanticScholar {
        query: String,
        #[arg(long, default_value_t = semantic_scholar::DEFAULT_LIMIT)]
        limit: u32,
        /// API key (optional, enables higher rate limits)
        #[arg(long, env = "SEMANTIC_SCHOLAR_API_KEY")]
        api_key: Option<String>,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Search arXiv and optionally download the PDFs
    Arxiv {
        query: String,
        #[arg(long, default_value_t = arxiv::DEFAULT_MAX_RESULTS)]
        max_results: u32,
        #[arg(long)]
        download: bool,
        #[arg(long, default_value = arxiv::DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
    },
    /// Look up a DOI on CrossRef
    Crossref {
        doi: String,
        /// Print the work record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find a paper by title, fetch its PDF and walk its reference list
    References {
        /// Paper title; prompted for on stdin when omitted
        title: Option<String>,
        #[arg(long)]
        no_download: bool,
        #[arg(long, default_value = references::DEFAULT_MAIN_DIR)]
        output_dir: PathBuf,
        /// Only print and look up the first N references
        #[arg(long)]
        max_references: Option<usize>,
        /// Skip the per-reference arXiv lookups
        #[arg(long)]
        no_arxiv: bool,
        /// Contact email for Unpaywall open-access lookups
        #[arg(long, env = "UNPAYWALL_EMAIL")]
        unpaywall_email: Option<String>,
    },
    /// arXiv search for "computer vision" plus a sample CrossRef lookup
    Demo {
        #[arg(long)]
        no_download: bool,
    },
    /// Generate text with a local causal language model (needs `--features onnx`)
    Generate {
        #[arg(long, default_value = generate::DEFAULT_PROMPT)]
        prompt: String,
        #[arg(long, default_value = generate::DEFAULT_MODEL_REPO)]
        model_repo: String,
        #[arg(long, default_value = generate::DEFAULT_MODEL_FILE)]
        model_file: String,
        #[arg(long, env = "PAPER_SCOUT_MODEL_DIR")]
        model_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 150)]
        max_new_tokens: usize,
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,
        #[arg(long, default_value_t = 0.9)]
        top_p: f32,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut config = Config::from_env();
    if let Some(secs) = cli.timeout {
        config.timeout = std::time::Duration::from_secs(secs);
    }
    if cli.mailto.is_some() {
        config.crossref_mailto = cli.mailto.clone();
    }

    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::SemanticScholar { query, limit, api_key, json } => {
            if api_key.is_some() {
                config.semantic_scholar_api_key = api_key;
            }
            let client = SemanticScholarClient::new(config.http_client()?, &config);
            let raw = client.search_raw(&query, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&raw)?);
            } else {
                let resp = serde_json::from_value(raw)
                    .context("Unexpected Semantic Scholar response shape")?;
                print!("{}", semantic_scholar::format_results(&resp));
            }
        }
        Command::Arxiv { query, max_results, download, output_dir } => {
            let client = ArxivClient::new(config.http_client()?, &config);
            let feed = client.search_feed(&query, max_results).await?;
            if download {
                let report = client.download_pdfs(&feed.entries, &output_dir).await?;
                for line in report.lines() {
                    println!("{}", line);
                }
            }
            println!("{}", client.format_results(&feed, true));
        }
        Command::Crossref { doi, json } => {
            let client = CrossRefClient::new(config.http_client()?, &config);
            let work = client.get_work(&doi).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&work)?);
            } else {
                print!("{}", crossref::format_work(&work));
            }
        }
        Command::References {
            title,
            no_download,
            output_dir,
            max_references,
            no_arxiv,
            unpaywall_email,
        } => {
            if unpaywall_email.is_some() {
                config.unpaywall_email = unpaywall_email;
            }
            let title = match title {
                Some(t) => t.trim().to_string(),
                None => references::prompt_title()?,
            };
            anyhow::ensure!(!title.is_empty(), "a paper title is required");

            let opts = FollowOptions {
                download: !no_download,
                main_dir: output_dir,
                max_references,
                arxiv_lookups: !no_arxiv,
                ..FollowOptions::default()
            };
            let follower = ReferenceFollower::new(&config)?;
            let outcome = follower.run(&title, &opts, &mut stdout).await?;
            tracing::info!(?outcome, "reference walk finished");
        }
        Command::Demo { no_download } => {
            let dir = PathBuf::from(arxiv::DEFAULT_OUTPUT_DIR);
            let download_dir = if no_download { None } else { Some(dir.as_path()) };
            demo::run(&config, download_dir, &mut stdout).await?;
        }
        Command::Generate {
            prompt,
            model_repo,
            model_file,
            model_dir,
            max_new_tokens,
            temperature,
            top_p,
            seed,
        } => {
            if let Some(dir) = model_dir {
                config.model_dir = dir;
            }
            let source = ModelSource { repo: model_repo, model_file };
            let defaults = GenerationConfig::default();
            let gen = GenerationConfig {
                max_new_tokens,
                temperature,
                top_p,
                seed: seed.unwrap_or(defaults.seed),
            };
            let text = generate::generate(&config, &source, &prompt, &gen).await?;
            println!("{}", text);
        }
    }

    Ok(())
}
