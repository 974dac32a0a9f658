mod analysis;
mod atomic;
mod catalog;
mod config;
mod crawler;
mod download;
mod error;
mod http;
mod listing;
mod policy;
mod sanitize;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::analysis::{AnalysisRequest, OpenAiAnalyzer, DEFAULT_PROMPT};
use crate::config::{RunOptions, Settings};
use crate::crawler::Crawler;
use crate::http::HttpFetcher;
use crate::policy::DownloadMode;

#[derive(Parser)]
#[command(name = "ced_crawler", about = "Download CED-QC personal interest disclosure PDFs")]
struct Cli {
    /// Root output directory (overrides CED_OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Log file, in addition to stderr
    #[arg(long, global = true, default_value = "ced_qc_crawler.log")]
    log_file: PathBuf,

    /// Only log to stderr
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the listing and download new documents
    Crawl {
        /// Download only the latest document for each person
        #[arg(long)]
        latest_only: bool,
        /// Skip downloading files that already exist
        #[arg(long)]
        skip_existing: bool,
        /// Summarize the downloaded documents afterwards
        #[arg(long)]
        analyze: bool,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Summarize already downloaded documents
    Analyze {
        /// Send only the latest document of each person
        #[arg(long)]
        latest_only: bool,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// List downloaded persons and their document counts
    Status,
}

#[derive(Args)]
struct AnalysisArgs {
    /// Only handle persons whose name contains this text
    #[arg(short, long)]
    person: Option<String>,
    /// Custom analysis prompt
    #[arg(long)]
    prompt: Option<String>,
    /// Where to write the analysis report
    #[arg(short, long, default_value = "analysis.md")]
    output: PathBuf,
}

impl AnalysisArgs {
    fn request(&self, mode: DownloadMode) -> AnalysisRequest {
        AnalysisRequest {
            options: RunOptions {
                mode,
                skip_existing: true,
                person_filter: self.person.clone(),
            },
            prompt: self.prompt.clone().unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            output: self.output.clone(),
        }
    }
}

fn init_tracing(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn run_analysis(settings: &Settings, request: &AnalysisRequest) -> anyhow::Result<()> {
    let analyzer = OpenAiAnalyzer::from_env(settings)?;
    let summary = analysis::analyze_people(&analyzer, settings, request).await?;
    println!(
        "Analyzed {} persons ({} failed, {} without documents). Report: {}",
        summary.analyzed,
        summary.failed,
        summary.without_documents,
        request.output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();
    init_tracing((!cli.no_log_file).then_some(&cli.log_file))?;

    let mut settings = Settings::load()?;
    if let Some(dir) = cli.output_dir {
        settings.output_dir = dir;
    }

    match cli.command {
        Commands::Crawl {
            latest_only,
            skip_existing,
            analyze,
            analysis,
        } => {
            let mode = DownloadMode::from_latest_flag(latest_only);
            let options = RunOptions {
                mode,
                skip_existing,
                person_filter: analysis.person.clone(),
            };
            let fetcher = HttpFetcher::new(&settings)?;
            let crawler = Crawler::new(settings.clone(), options, fetcher);
            let summary = crawler.run().await?;
            summary.print();

            if analyze {
                run_analysis(&settings, &analysis.request(mode)).await?;
            }
        }
        Commands::Analyze {
            latest_only,
            analysis,
        } => {
            let request = analysis.request(DownloadMode::from_latest_flag(latest_only));
            run_analysis(&settings, &request).await?;
        }
        Commands::Status => {
            let people = analysis::discover(&settings.section_dir())?;
            if people.is_empty() {
                println!("Nothing downloaded yet under {}.", settings.section_dir().display());
                return Ok(());
            }
            println!("{:>3} | {:<48} | {:>4}", "#", "Name", "Docs");
            println!("{}", "-".repeat(62));
            for (i, p) in people.iter().enumerate() {
                println!(
                    "{:>3} | {:<48} | {:>4}",
                    i + 1,
                    fit_width(&p.catalog.name, 48),
                    p.catalog.documents.len()
                );
            }
            let total: usize = people.iter().map(|p| p.catalog.documents.len()).sum();
            println!("\n{} persons, {} documents", people.len(), total);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }
    Ok(())
}

/// Clip a table cell to `width` characters, marking the cut with `…`.
fn fit_width(cell: &str, width: usize) -> String {
    if cell.chars().count() <= width {
        return cell.to_string();
    }
    let mut clipped: String = cell.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

/// `4.2s` under a minute, `H:MM:SS` beyond.
fn elapsed_label(elapsed: std::time::Duration) -> String {
    let Ok(delta) = chrono::TimeDelta::from_std(elapsed) else {
        return format!("{:?}", elapsed);
    };
    if delta.num_minutes() == 0 {
        return format!("{:.1}s", elapsed.as_secs_f64());
    }
    format!(
        "{}:{:02}:{:02}",
        delta.num_hours(),
        delta.num_minutes() % 60,
        delta.num_seconds() % 60
    )
}
