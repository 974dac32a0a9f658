use std::path::PathBuf;

use thiserror::Error;

/// Transport-level failure for a single GET.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Why one document could not be saved.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Crawl errors. Only `ListingFetch` aborts a run; the rest are logged and the
/// crawl moves on to the next row, document or person.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to fetch listing page {url}: {source}")]
    ListingFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("listing row {row}: {reason}")]
    ListingParse { row: usize, reason: String },

    #[error("download of document {doc_id} for {person} from {url} failed: {source}")]
    Download {
        person: String,
        doc_id: String,
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("catalog {path}: {source}")]
    CatalogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CrawlError {
    pub fn catalog_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CrawlError::CatalogIo {
            path: path.into(),
            source,
        }
    }
}
