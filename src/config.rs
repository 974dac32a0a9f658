use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ::config::{Config, Environment};
use serde::Deserialize;

use crate::policy::DownloadMode;

pub const DEFAULT_LISTING_URL: &str = "https://www.ced-qc.ca/fr/registres-publics/sommaires-des-declarations-des-interets-personnels/22-membres-du-conseil-executif-et-deputes";
pub const DEFAULT_SECTION_SLUG: &str = "sommaires-des-declarations-des-interets-personnels";

/// Deployment settings. Every field can be overridden with a `CED_` variable,
/// e.g. `CED_DELAY_MAX_MS=500`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listing_url: String,
    pub output_dir: PathBuf,
    pub section_slug: String,
    pub timeout_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub debug_dir: Option<PathBuf>,
    pub analysis_model: String,
    pub analysis_base_url: String,
    pub analysis_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            output_dir: PathBuf::from("output"),
            section_slug: DEFAULT_SECTION_SLUG.to_string(),
            timeout_secs: 30,
            delay_min_ms: 1000,
            delay_max_ms: 3000,
            debug_dir: None,
            analysis_model: "gpt-4o-mini".to_string(),
            analysis_base_url: "https://api.openai.com/v1".to_string(),
            analysis_timeout_secs: 300,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let defaults = Settings::default();
        Config::builder()
            .set_default("listing_url", defaults.listing_url)?
            .set_default("output_dir", defaults.output_dir.to_string_lossy().into_owned())?
            .set_default("section_slug", defaults.section_slug)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default("delay_min_ms", defaults.delay_min_ms)?
            .set_default("delay_max_ms", defaults.delay_max_ms)?
            .set_default("analysis_model", defaults.analysis_model)?
            .set_default("analysis_base_url", defaults.analysis_base_url)?
            .set_default("analysis_timeout_secs", defaults.analysis_timeout_secs)?
            .add_source(Environment::with_prefix("CED"))
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Invalid CED_* configuration")
    }

    /// `<output_dir>/<section_slug>`, the parent of every person directory.
    pub fn section_dir(&self) -> PathBuf {
        self.output_dir.join(&self.section_slug)
    }

    pub fn person_dir(&self, sanitized: &str) -> PathBuf {
        self.section_dir().join(sanitized)
    }
}

/// Per-invocation options resolved from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: DownloadMode,
    pub skip_existing: bool,
    pub person_filter: Option<String>,
}

impl RunOptions {
    /// Case-insensitive substring match on either name form.
    pub fn wants(&self, display_name: &str, sanitized: &str) -> bool {
        match &self.person_filter {
            None => true,
            Some(filter) => {
                let needle = filter.to_lowercase();
                display_name.to_lowercase().contains(&needle)
                    || sanitized.to_lowercase().contains(&needle)
            }
        }
    }
}

pub fn catalog_path(person_dir: &Path, sanitized: &str) -> PathBuf {
    person_dir.join(format!("{}.json", sanitized))
}
