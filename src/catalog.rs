use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::CrawlError;

/// Per-person record stored next to the PDFs as `<sanitized>.json`.
///
/// `documents` behaves as an insertion-ordered set: merges append unseen
/// filenames and never drop existing ones, even when a document disappears
/// from the live listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    #[serde(default)]
    pub documents: Vec<String>,
}

impl Catalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Vec::new(),
        }
    }

    /// `Ok(None)` when no catalog exists yet.
    pub fn load(path: &Path) -> Result<Option<Self>, CrawlError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CrawlError::catalog_io(path, e)),
        };
        let mut catalog: Catalog = serde_json::from_slice(&raw)
            .map_err(|e| CrawlError::catalog_io(path, e.into()))?;
        catalog.dedup();
        Ok(Some(catalog))
    }

    /// Append filenames not already listed. Returns how many were added.
    pub fn merge<I, S>(&mut self, filenames: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: HashSet<String> = self.documents.iter().cloned().collect();
        let before = self.documents.len();
        for name in filenames {
            let name = name.as_ref();
            if seen.insert(name.to_string()) {
                self.documents.push(name.to_string());
            }
        }
        self.documents.len() - before
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.documents.iter().any(|d| d == filename)
    }

    fn dedup(&mut self) {
        let mut seen = HashSet::new();
        self.documents.retain(|d| seen.insert(d.clone()));
    }

    pub fn to_json(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        // Plain strings and a Vec cannot fail to serialize.
        self.serialize(&mut ser).unwrap_or_default();
        out
    }

    /// Overwrite the catalog file. Returns `false` without touching the file
    /// when it already holds exactly this content.
    pub fn save(&self, path: &Path) -> Result<bool, CrawlError> {
        let json = self.to_json();
        if std::fs::read(path).map(|cur| cur == json).unwrap_or(false) {
            return Ok(false);
        }
        write_atomic(path, &json).map_err(|e| CrawlError::catalog_io(path, e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_order_and_dedups() {
        let mut catalog = Catalog::new("Jean Tremblay");
        catalog.documents = vec!["document_1_2020-2021.pdf".into()];
        let added = catalog.merge(["document_1_2020-2021.pdf", "document_2_2022-2023.pdf"]);
        assert_eq!(added, 1);
        assert_eq!(
            catalog.documents,
            ["document_1_2020-2021.pdf", "document_2_2022-2023.pdf"]
        );
    }

    #[test]
    fn merge_never_removes() {
        let mut catalog = Catalog::new("X");
        catalog.documents = vec!["old.pdf".into(), "kept.pdf".into()];
        catalog.merge(["kept.pdf"]);
        assert_eq!(catalog.documents, ["old.pdf", "kept.pdf"]);
        assert!(catalog.contains("old.pdf"));
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Catalog::load(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn invalid_json_is_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Catalog::load(&path), Err(CrawlError::CatalogIo { .. })));
    }

    #[test]
    fn save_round_trips_and_skips_identical_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Côté.json");
        let mut catalog = Catalog::new("Marie Côté (Laval)");
        catalog.merge(["document_3_2021.pdf"]);

        assert!(catalog.save(&path).unwrap());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"Marie Côté (Laval)\""));
        assert!(text.contains("\n    \"name\""));

        assert!(!catalog.save(&path).unwrap());
        assert_eq!(Catalog::load(&path).unwrap(), Some(catalog));
    }

    #[test]
    fn load_drops_duplicate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.json");
        std::fs::write(&path, r#"{"name":"D","documents":["a.pdf","b.pdf","a.pdf"]}"#).unwrap();
        let catalog = Catalog::load(&path).unwrap().unwrap();
        assert_eq!(catalog.documents, ["a.pdf", "b.pdf"]);
    }
}
