//! Hands stored PDFs to an external summarization service.
//!
//! The crawler never depends on this module; it only reads what earlier
//! crawls left on disk (catalogs and PDFs).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::atomic::write_atomic;
use crate::catalog::Catalog;
use crate::config::{catalog_path, RunOptions, Settings};
use crate::listing::year_label_of;
use crate::policy::{latest_index, DownloadMode};

pub const DEFAULT_PROMPT: &str = "You are reviewing public disclosure summaries of personal interests filed by a member of the Quebec National Assembly. Summarize the declared interests: companies and shareholdings, real estate, debts, outside activities and those of the spouse or dependants. When several years are provided, point out what changed between them.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn summarize(&self, pdfs: &[PathBuf], prompt: &str) -> Result<String, AnalysisError>;
}

/// OpenAI Responses API client that attaches PDFs as base64 `input_file` parts.
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiAnalyzer {
    pub fn new(api_key: impl Into<String>, settings: &Settings) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.analysis_timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: settings.analysis_base_url.trim_end_matches('/').to_string(),
            model: settings.analysis_model.clone(),
        })
    }

    /// Reads `OPENAI_API_KEY`.
    pub fn from_env(settings: &Settings) -> Result<Self, AnalysisError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AnalysisError::Config("OPENAI_API_KEY not set".into()))?;
        Self::new(api_key, settings)
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn summarize(&self, pdfs: &[PathBuf], prompt: &str) -> Result<String, AnalysisError> {
        let mut files = Vec::with_capacity(pdfs.len());
        for path in pdfs {
            let bytes = std::fs::read(path).map_err(|source| AnalysisError::Io {
                path: path.clone(),
                source,
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".into());
            files.push((name, bytes));
        }

        let body = build_request(&self.model, prompt, &files);
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api(format!("{}: {}", status, text)));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;
        extract_output_text(&value)
            .ok_or_else(|| AnalysisError::Parse("no output_text in response".into()))
    }
}

pub fn build_request(model: &str, prompt: &str, files: &[(String, Vec<u8>)]) -> Value {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut content: Vec<Value> = files
        .iter()
        .map(|(name, bytes)| {
            json!({
                "type": "input_file",
                "filename": name,
                "file_data": format!("data:application/pdf;base64,{}", engine.encode(bytes)),
            })
        })
        .collect();
    content.push(json!({ "type": "input_text", "text": prompt }));

    json!({
        "model": model,
        "input": [{ "role": "user", "content": content }],
    })
}

pub fn extract_output_text(response: &Value) -> Option<String> {
    if let Some(text) = response.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let parts: Vec<&str> = response
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// A person directory with its catalog, as left by a crawl.
#[derive(Debug)]
pub struct StoredPerson {
    pub dir: PathBuf,
    pub sanitized_name: String,
    pub catalog: Catalog,
}

impl StoredPerson {
    /// Catalogued PDFs that exist on disk, filtered by `mode`.
    pub fn pdfs(&self, mode: DownloadMode) -> Vec<PathBuf> {
        let present: Vec<&String> = self
            .catalog
            .documents
            .iter()
            .filter(|f| self.dir.join(f).is_file())
            .collect();
        let chosen = match mode {
            DownloadMode::All => present,
            DownloadMode::LatestOnly => {
                let labels = present.iter().map(|f| year_label_of(f).unwrap_or("unknown"));
                latest_index(labels)
                    .map(|i| vec![present[i]])
                    .unwrap_or_default()
            }
        };
        chosen.into_iter().map(|f| self.dir.join(f)).collect()
    }
}

/// Every person directory under `section_dir` that holds a readable catalog,
/// sorted by directory name.
pub fn discover(section_dir: &Path) -> std::io::Result<Vec<StoredPerson>> {
    let mut dirs: Vec<PathBuf> = match std::fs::read_dir(section_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    dirs.sort();

    let mut people = Vec::new();
    for dir in dirs {
        let Some(sanitized) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        match Catalog::load(&catalog_path(&dir, &sanitized)) {
            Ok(Some(catalog)) => people.push(StoredPerson {
                dir,
                sanitized_name: sanitized,
                catalog,
            }),
            Ok(None) => warn!("no catalog in {}", dir.display()),
            Err(e) => warn!("{}", e),
        }
    }
    Ok(people)
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub options: RunOptions,
    pub prompt: String,
    pub output: PathBuf,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub analyzed: usize,
    pub failed: usize,
    pub without_documents: usize,
}

/// Summarize each stored person and write one Markdown report.
pub async fn analyze_people<A: Analyzer + ?Sized>(
    analyzer: &A,
    settings: &Settings,
    request: &AnalysisRequest,
) -> anyhow::Result<AnalysisSummary> {
    let people = discover(&settings.section_dir())?;
    let mut summary = AnalysisSummary::default();
    let mut report = format!(
        "# CED-QC disclosure analysis\n\nGenerated {}\n\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    );

    for person in people
        .iter()
        .filter(|p| request.options.wants(&p.catalog.name, &p.sanitized_name))
    {
        let pdfs = person.pdfs(request.options.mode);
        if pdfs.is_empty() {
            warn!(person = %person.catalog.name, "no downloaded documents to analyze");
            summary.without_documents += 1;
            continue;
        }

        info!(person = %person.catalog.name, documents = pdfs.len(), "analyzing");
        report.push_str(&format!("## {}\n\n", person.catalog.name));
        let files: Vec<String> = pdfs
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        report.push_str(&format!("Documents: {}\n\n", files.join(", ")));

        match analyzer.summarize(&pdfs, &request.prompt).await {
            Ok(text) => {
                summary.analyzed += 1;
                report.push_str(text.trim());
                report.push_str("\n\n");
            }
            Err(e) => {
                error!(person = %person.catalog.name, "analysis failed: {}", e);
                summary.failed += 1;
                report.push_str(&format!("_Analysis failed: {}_\n\n", e));
            }
        }
    }

    write_atomic(&request.output, report.as_bytes())?;
    info!(
        analyzed = summary.analyzed,
        failed = summary.failed,
        "wrote analysis to {}",
        request.output.display()
    );
    Ok(summary)
}
