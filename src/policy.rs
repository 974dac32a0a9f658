use std::sync::LazyLock;

use regex::Regex;

use crate::listing::DocumentRef;

static YEAR_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(?:-(\d{4}))?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMode {
    #[default]
    All,
    LatestOnly,
}

impl DownloadMode {
    pub fn from_latest_flag(latest_only: bool) -> Self {
        if latest_only {
            DownloadMode::LatestOnly
        } else {
            DownloadMode::All
        }
    }
}

/// Sort key for a year label such as `2022-2023` or `2021`: (end year,
/// start year). `None` for anything else, which ranks below every dated label.
pub fn year_key(label: &str) -> Option<(u32, u32)> {
    let caps = YEAR_RANGE_RE.captures(label.trim())?;
    let start: u32 = caps.get(1)?.as_str().parse().ok()?;
    let end = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(start);
    Some((end, start))
}

/// Index of the most recent label; the first one wins on ties.
pub fn latest_index<'a, I>(labels: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, Option<(u32, u32)>)> = None;
    for (i, label) in labels.into_iter().enumerate() {
        let key = year_key(label);
        match best {
            Some((_, best_key)) if key <= best_key => {}
            _ => best = Some((i, key)),
        }
    }
    best.map(|(i, _)| i)
}

pub fn select_documents(docs: &[DocumentRef], mode: DownloadMode) -> Vec<&DocumentRef> {
    match mode {
        DownloadMode::All => docs.iter().collect(),
        DownloadMode::LatestOnly => latest_index(docs.iter().map(|d| d.year_label.as_str()))
            .map(|i| vec![&docs[i]])
            .unwrap_or_default(),
    }
}
