//! Command-line interface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use litscout_harvester::input::{read_candidates, read_repositories};
use litscout_harvester::{Fetcher, QueryEngine, Retriever, SourceRepository};

use crate::config::{PipelineConfig, DEFAULT_CONFIG_PATH};
use crate::error::{PipelineError, Result};
use crate::orchestrator::{cancel_on_ctrl_c, Orchestrator, PoolSettings, RunSummary};
use crate::screening::{build_classifier, PdfTextExtractor, Screener, ScreeningSettings};

const RETRIEVAL_LOG: &str = "retrieval_log.csv";
const SCREENING_LOG: &str = "screening_report.csv";

/// litscout - Discover, download and screen academic literature from
/// institutional repositories.
#[derive(Parser)]
#[command(name = "litscout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: litscout.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search repositories for the configured terms and log candidate articles.
    Discover {
        /// Repository list (CSV: id,name,url or the wide registry export)
        #[arg(long)]
        repos: PathBuf,

        /// Discovery log to append candidates to
        #[arg(long)]
        output: PathBuf,

        /// Index of the first repository to process
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Maximum number of repositories to process
        #[arg(long)]
        limit: Option<usize>,

        /// Search term, overriding harvest.search_terms (repeatable)
        #[arg(long = "term")]
        terms: Vec<String>,
    },

    /// Resolve and download the PDF of every candidate.
    Download {
        /// Candidate batches (CSV), processed in order
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Download directory
        #[arg(long)]
        dir: PathBuf,

        /// Retrieval log (default: <dir>/retrieval_log.csv)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Skip links already recorded as successful in the retrieval log
        #[arg(long)]
        resume: bool,
    },

    /// Classify downloaded PDFs and file them into outcome directories.
    Screen {
        /// Directory holding the PDFs to screen
        #[arg(long)]
        dir: PathBuf,

        /// Research topic, overriding screening.topic
        #[arg(long)]
        topic: Option<String>,

        /// Extra exclusion criteria, prepended to screening.exclusion_criteria
        #[arg(long)]
        exclude: Option<String>,

        /// Screening log (default: <dir>/screening_report.csv)
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

/// Run the CLI.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let explicit = cli.config.is_some();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = PipelineConfig::load(&config_path, explicit)?;
    config.validate()?;

    let summary = match cli.command {
        Commands::Discover {
            repos,
            output,
            start,
            limit,
            terms,
        } => discover_command(&config, &repos, &output, start, limit, terms).await?,
        Commands::Download {
            input,
            dir,
            log,
            resume,
        } => {
            let log = log.unwrap_or_else(|| dir.join(RETRIEVAL_LOG));
            download_command(&config, &input, &dir, &log, resume).await?
        }
        Commands::Screen {
            dir,
            topic,
            exclude,
            log,
        } => {
            let log = log.unwrap_or_else(|| dir.join(SCREENING_LOG));
            screen_command(&config, &dir, topic.as_deref(), exclude.as_deref(), &log).await?
        }
    };

    print_summary(&summary);
    Ok(())
}

async fn discover_command(
    config: &PipelineConfig,
    repos: &Path,
    output: &Path,
    start: usize,
    limit: Option<usize>,
    terms: Vec<String>,
) -> Result<RunSummary> {
    let terms = if terms.is_empty() {
        config.harvest.search_terms.clone()
    } else {
        terms
    };
    if terms.is_empty() {
        return Err(PipelineError::Config(
            "harvest.search_terms is empty and no --term was given".into(),
        ));
    }

    let repositories = select_window(read_repositories(repos)?, start, limit)?;

    println!(
        "{} {} repositories for {} terms",
        style("Searching").bold(),
        style(repositories.len()).cyan(),
        style(terms.len()).cyan()
    );

    let h = &config.harvest;
    let engine = QueryEngine::with_endpoints(
        Fetcher::new(h.search_timeout())?,
        &h.endpoints,
        h.page_size,
        &h.item_marker,
    );

    let orchestrator = orchestrator(config);
    let summary = orchestrator
        .discover(Arc::new(engine), repositories, &terms, output)
        .await;
    finish(&orchestrator, summary)
}

async fn download_command(
    config: &PipelineConfig,
    inputs: &[PathBuf],
    dir: &Path,
    log: &Path,
    resume: bool,
) -> Result<RunSummary> {
    let mut candidates = Vec::new();
    for input in inputs {
        let batch = read_candidates(input)?;
        tracing::info!(input = %input.display(), candidates = batch.len(), "loaded batch");
        candidates.extend(batch);
    }

    println!(
        "{} {} candidates into {}",
        style("Downloading").bold(),
        style(candidates.len()).cyan(),
        style(dir.display()).green()
    );

    let h = &config.harvest;
    let s = &config.screening;
    let retriever = Retriever::from_fetcher(Fetcher::new(h.download_timeout())?, dir)
        .with_max_bytes(h.max_download_bytes())
        .with_filed_dirs([&s.match_dir, &s.no_match_dir]);

    let orchestrator = orchestrator(config);
    let summary = orchestrator
        .retrieve(Arc::new(retriever), candidates, log, resume)
        .await;
    finish(&orchestrator, summary)
}

async fn screen_command(
    config: &PipelineConfig,
    dir: &Path,
    topic: Option<&str>,
    exclude: Option<&str>,
    log: &Path,
) -> Result<RunSummary> {
    if !dir.is_dir() {
        return Err(PipelineError::InvalidInput(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let classifier = build_classifier(config.require_classifier()?)?;
    let settings = ScreeningSettings::from_config(&config.screening, topic, exclude);

    println!(
        "{} {} for '{}'",
        style("Screening").bold(),
        style(dir.display()).green(),
        style(&settings.topic).cyan()
    );

    let screener = Screener::new(classifier, Arc::new(PdfTextExtractor), settings);
    let orchestrator = orchestrator(config);
    let summary = orchestrator.screen(Arc::new(screener), dir, log).await;
    finish(&orchestrator, summary)
}

/// Apply `--start` / `--limit` to the repository list.
pub fn select_window(
    repositories: Vec<SourceRepository>,
    start: usize,
    limit: Option<usize>,
) -> Result<Vec<SourceRepository>> {
    if repositories.is_empty() {
        return Err(PipelineError::InvalidInput("repository list is empty".into()));
    }
    if start >= repositories.len() {
        return Err(PipelineError::Config(format!(
            "--start {start} is beyond the {} repositories in the list",
            repositories.len()
        )));
    }
    let end = limit.map_or(repositories.len(), |l| {
        start.saturating_add(l).min(repositories.len())
    });
    Ok(repositories
        .into_iter()
        .skip(start)
        .take(end - start)
        .collect())
}

fn orchestrator(config: &PipelineConfig) -> Orchestrator {
    let pb = ProgressBar::new(0);
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30}] {pos}/{len} {wide_msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let orchestrator = Orchestrator::new(PoolSettings {
        concurrency: config.harvest.concurrency,
        delay: config.harvest.delay(),
    })
    .with_progress(pb);
    cancel_on_ctrl_c(orchestrator.cancellation_token());
    orchestrator
}

fn finish(orchestrator: &Orchestrator, summary: Result<RunSummary>) -> Result<RunSummary> {
    orchestrator.progress().finish_and_clear();
    summary
}

fn print_summary(summary: &RunSummary) {
    println!();
    let headline = if summary.cancelled {
        style("Interrupted").yellow().bold()
    } else {
        style("Done").green().bold()
    };
    println!("{} {}", headline, summary.stage);
    for (category, n) in &summary.counts {
        println!("  {category}: {}", style(n).cyan());
    }
}
