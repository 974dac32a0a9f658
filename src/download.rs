use std::path::Path;

use tracing::{debug, info};

use crate::atomic::write_atomic;
use crate::error::DownloadError;
use crate::http::Fetcher;

#[derive(Debug)]
pub enum FetchOutcome {
    Downloaded { bytes: usize },
    Skipped,
    Failed(DownloadError),
}

/// Download one document to `dest`. With `skip_if_exists`, an existing file
/// short-circuits before any request is made. No retries.
pub async fn fetch_document<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    dest: &Path,
    skip_if_exists: bool,
) -> FetchOutcome {
    if skip_if_exists && dest.is_file() {
        info!("Skipping existing file: {}", dest.display());
        return FetchOutcome::Skipped;
    }

    let body = match fetcher.get(url).await {
        Ok(body) => body,
        Err(e) => return FetchOutcome::Failed(e.into()),
    };

    if let Err(e) = write_atomic(dest, &body) {
        return FetchOutcome::Failed(DownloadError::Write {
            path: dest.to_path_buf(),
            source: e,
        });
    }
    debug!(url, bytes = body.len(), "saved {}", dest.display());
    FetchOutcome::Downloaded { bytes: body.len() }
}
