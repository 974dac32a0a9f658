use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::{catalog_path, RunOptions, Settings};
use crate::download::{fetch_document, FetchOutcome};
use crate::error::CrawlError;
use crate::http::Fetcher;
use crate::listing::{container_snippets, fetch_listing, parse_listing, PersonEntry};
use crate::policy::select_documents;

/// Aggregate counts for one crawl.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub persons_seen: usize,
    pub persons_processed: usize,
    pub persons_failed: usize,
    pub rows_rejected: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn print(&self) {
        println!(
            "Processed {} of {} persons ({} failed, {} rows rejected).",
            self.persons_processed, self.persons_seen, self.persons_failed, self.rows_rejected
        );
        println!(
            "Documents: {} downloaded, {} skipped, {} failed.",
            self.downloaded, self.skipped, self.failed
        );
    }
}

#[derive(Debug, Default)]
struct PersonStats {
    downloaded: usize,
    skipped: usize,
    failed: usize,
}

impl PersonStats {
    fn all_failed(&self) -> bool {
        self.failed > 0 && self.downloaded == 0 && self.skipped == 0
    }
}

/// Drives one crawl: listing, then each person in page order.
pub struct Crawler<F> {
    settings: Settings,
    options: RunOptions,
    fetcher: F,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(settings: Settings, options: RunOptions, fetcher: F) -> Self {
        Self {
            settings,
            options,
            fetcher,
        }
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Only a failed listing fetch is returned as an error; everything after
    /// that is logged and counted.
    pub async fn run(&self) -> Result<RunSummary, CrawlError> {
        info!("Starting CED-QC PDF download process");
        let url = &self.settings.listing_url;
        let html = fetch_listing(&self.fetcher, url).await?;
        self.dump_debug("full_page.html", &html);

        let listing = parse_listing(&html, url);
        if listing.strategy != Some("primary") {
            for (i, snippet) in container_snippets(&html).iter().enumerate() {
                self.dump_debug(&format!("texte_element_{}.html", i), snippet);
            }
        }

        let mut summary = RunSummary {
            rows_rejected: listing.rejected.len(),
            ..RunSummary::default()
        };

        let persons: Vec<&PersonEntry> = listing
            .persons
            .iter()
            .filter(|p| self.options.wants(&p.display_name, &p.sanitized_name))
            .collect();
        summary.persons_seen = persons.len();
        info!("Found {} persons to process", persons.len());

        let pb = ProgressBar::new(persons.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        for person in persons {
            pb.set_message(person.display_name.clone());
            match self.process_person(person).await {
                Ok(stats) => {
                    summary.downloaded += stats.downloaded;
                    summary.skipped += stats.skipped;
                    summary.failed += stats.failed;
                    if stats.all_failed() {
                        error!(person = %person.display_name, "every download failed");
                        summary.persons_failed += 1;
                    } else {
                        summary.persons_processed += 1;
                    }
                }
                Err(e) => {
                    error!(person = %person.display_name, "Error processing person: {}", e);
                    summary.persons_failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            persons = summary.persons_processed,
            failed_persons = summary.persons_failed,
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "CED-QC PDF download process completed"
        );
        Ok(summary)
    }

    async fn process_person(&self, person: &PersonEntry) -> Result<PersonStats, CrawlError> {
        let dir = self.settings.person_dir(&person.sanitized_name);
        std::fs::create_dir_all(&dir).map_err(|e| CrawlError::catalog_io(&dir, e))?;
        let json_path = catalog_path(&dir, &person.sanitized_name);

        let existing = match Catalog::load(&json_path) {
            Ok(found) => found,
            Err(e) => {
                warn!(person = %person.display_name, "{}; starting a fresh catalog", e);
                None
            }
        };

        let mut stats = PersonStats::default();
        let mut kept = Vec::new();

        for doc in select_documents(&person.documents, self.options.mode) {
            let dest = dir.join(&doc.local_filename);
            let listed = existing
                .as_ref()
                .map(|c| c.contains(&doc.local_filename))
                .unwrap_or(false);
            if listed && !dest.is_file() {
                warn!(person = %person.display_name, file = %doc.local_filename, "catalogued file missing on disk");
            }

            match fetch_document(&self.fetcher, &doc.source_url, &dest, self.options.skip_existing).await {
                FetchOutcome::Downloaded { bytes } => {
                    info!(bytes, "Downloaded {} for {}", doc.local_filename, person.display_name);
                    stats.downloaded += 1;
                    kept.push(doc.local_filename.as_str());
                }
                FetchOutcome::Skipped => {
                    stats.skipped += 1;
                    kept.push(doc.local_filename.as_str());
                }
                FetchOutcome::Failed(source) => {
                    let err = CrawlError::Download {
                        person: person.display_name.clone(),
                        doc_id: doc.id.clone(),
                        url: doc.source_url.clone(),
                        source,
                    };
                    error!("{}", err);
                    stats.failed += 1;
                }
            }
        }

        let mut catalog = existing.unwrap_or_else(|| Catalog::new(&person.display_name));
        catalog.name = person.display_name.clone();
        catalog.merge(kept);
        match catalog.save(&json_path) {
            Ok(true) => info!("Created/Updated JSON file for {}", person.display_name),
            Ok(false) => {}
            Err(e) => error!(person = %person.display_name, "{}", e),
        }

        Ok(stats)
    }

    fn dump_debug(&self, name: &str, content: &str) {
        let Some(dir) = &self.settings.debug_dir else {
            return;
        };
        if let Err(e) = save_snippet(dir, name, content) {
            warn!("could not save debug snippet {}: {}", name, e);
        }
    }
}

fn save_snippet(dir: &Path, name: &str, content: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(name), content)
}
