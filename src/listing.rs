use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CrawlError, FetchError};
use crate::http::Fetcher;
use crate::sanitize::sanitize_name;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}(?:-\d{4})?").unwrap());
static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^document_(.+)_(\d{4}(?:-\d{4})?|unknown)\.pdf$").unwrap());

static PRIMARY_ROWS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.texte_contenuStructure > div > ul > li > ul > li").unwrap()
});
static NESTED_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul > li > ul > li").unwrap());
static CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.texte_contenuStructure").unwrap());
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static ID_ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[data-id-document]").unwrap());
static HREF_ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const UNKNOWN: &str = "unknown";
const NAME_TAGS: &[&str] = &["span", "strong", "b", "em"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: String,
    pub year_label: String,
    pub source_url: String,
    pub local_filename: String,
}

impl DocumentRef {
    pub fn new(id: &str, year_label: &str, source_url: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            year_label: year_label.to_string(),
            source_url: source_url.into(),
            local_filename: document_filename(id, year_label),
        }
    }
}

pub fn document_filename(id: &str, year_label: &str) -> String {
    format!("document_{}_{}.pdf", id, year_label)
}

/// Year label back out of a `document_<id>_<year>.pdf` name.
pub fn year_label_of(filename: &str) -> Option<&str> {
    FILENAME_RE
        .captures(filename)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonEntry {
    pub display_name: String,
    pub sanitized_name: String,
    pub documents: Vec<DocumentRef>,
}

/// Result of parsing one listing page.
#[derive(Debug, Default)]
pub struct Listing {
    /// Name of the row strategy that matched, if any did.
    pub strategy: Option<&'static str>,
    pub persons: Vec<PersonEntry>,
    pub rejected: Vec<CrawlError>,
}

/// Finds candidate person rows in a document.
pub struct RowStrategy {
    pub name: &'static str,
    pub find: for<'a> fn(&'a Html) -> Vec<ElementRef<'a>>,
}

/// Finds document anchors inside one person row.
pub struct LinkStrategy {
    pub name: &'static str,
    pub find: for<'a> fn(ElementRef<'a>) -> Vec<ElementRef<'a>>,
}

/// Tried in order; the first strategy returning rows wins.
pub const ROW_STRATEGIES: &[RowStrategy] = &[
    RowStrategy {
        name: "primary",
        find: primary_rows,
    },
    RowStrategy {
        name: "nested-list",
        find: nested_list_rows,
    },
];

pub const LINK_STRATEGIES: &[LinkStrategy] = &[
    LinkStrategy {
        name: "nested-list",
        find: nested_list_links,
    },
    LinkStrategy {
        name: "document-id",
        find: document_id_links,
    },
    LinkStrategy {
        name: "pdf-href",
        find: pdf_href_links,
    },
];

fn primary_rows(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.select(&PRIMARY_ROWS).collect()
}

fn nested_list_rows(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.select(&NESTED_ROWS)
        .filter(|li| nested_list(*li).is_some())
        .collect()
}

fn nested_list_links(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    nested_list(row)
        .map(|ul| ul.select(&ANCHORS).collect())
        .unwrap_or_default()
}

fn document_id_links(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.select(&ID_ANCHORS).collect()
}

fn pdf_href_links(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.select(&HREF_ANCHORS)
        .filter(|a| {
            a.value()
                .attr("href")
                .map(|h| h.to_lowercase().ends_with(".pdf"))
                .unwrap_or(false)
        })
        .collect()
}

/// First `<ul>` among the direct children of `li`.
fn nested_list(li: ElementRef<'_>) -> Option<ElementRef<'_>> {
    li.children()
        .filter_map(ElementRef::wrap)
        .find(|child| child.value().name() == "ul")
}

/// Text of the row's direct children up to its nested list.
fn extract_name(row: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for child in row.children() {
        match child.value() {
            Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            Node::Element(el) if el.name() == "ul" => break,
            Node::Element(el) if NAME_TAGS.contains(&el.name()) => {
                if let Some(el) = ElementRef::wrap(child) {
                    let t = el.text().collect::<String>();
                    let t = t.trim();
                    if !t.is_empty() {
                        parts.push(t.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_year(text: &str) -> String {
    YEAR_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn to_document(anchor: ElementRef<'_>, base: Option<&Url>) -> Option<DocumentRef> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }
    let url = match base.and_then(|b| b.join(href).ok()) {
        Some(u) => u.to_string(),
        None => href.to_string(),
    };
    let id = anchor.value().attr("data-id-document").unwrap_or(UNKNOWN).trim();
    let id = if id.is_empty() { UNKNOWN } else { id };
    let text = anchor.text().collect::<String>();
    Some(DocumentRef::new(id, &extract_year(&text), url))
}

fn parse_row(index: usize, row: ElementRef<'_>, base: Option<&Url>) -> Result<PersonEntry, CrawlError> {
    let reject = |reason: String| CrawlError::ListingParse { row: index, reason };

    let display_name = extract_name(row);
    if display_name.is_empty() {
        return Err(reject("empty name".to_string()));
    }

    let Some((strategy, anchors)) = LINK_STRATEGIES.iter().find_map(|s| {
        let found = (s.find)(row);
        (!found.is_empty()).then_some((s.name, found))
    }) else {
        return Err(reject(format!("no document links for {}", display_name)));
    };
    debug!(row = index, person = %display_name, strategy, "document links found");

    let mut documents = Vec::with_capacity(anchors.len());
    for anchor in anchors {
        match to_document(anchor, base) {
            Some(doc) => documents.push(doc),
            None => warn!(person = %display_name, "link without href, skipping"),
        }
    }
    if documents.is_empty() {
        return Err(reject(format!("no usable document links for {}", display_name)));
    }

    Ok(PersonEntry {
        sanitized_name: sanitize_name(&display_name),
        display_name,
        documents,
    })
}

/// Recover every person and their documents from the listing page, in page
/// order. Relative links are resolved against `base_url`.
pub fn parse_listing(html: &str, base_url: &str) -> Listing {
    let doc = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let containers = doc.select(&CONTAINERS).count();
    debug!(containers, "listing containers");

    let mut listing = Listing::default();
    let Some((strategy, rows)) = ROW_STRATEGIES.iter().find_map(|s| {
        let rows = (s.find)(&doc);
        if rows.is_empty() {
            debug!(strategy = s.name, "row strategy matched nothing");
            None
        } else {
            Some((s.name, rows))
        }
    }) else {
        warn!("no person rows found by any strategy");
        return listing;
    };

    info!(strategy, rows = rows.len(), "person rows found");
    listing.strategy = Some(strategy);

    for (i, row) in rows.into_iter().enumerate() {
        match parse_row(i, row, base.as_ref()) {
            Ok(person) => listing.persons.push(person),
            Err(e) => {
                warn!("{}", e);
                listing.rejected.push(e);
            }
        }
    }
    listing
}

/// HTML of each main content container, for debug dumps.
pub fn container_snippets(html: &str) -> Vec<String> {
    Html::parse_document(html)
        .select(&CONTAINERS)
        .map(|el| el.html())
        .collect()
}

pub async fn fetch_listing<F: Fetcher + ?Sized>(fetcher: &F, url: &str) -> Result<String, CrawlError> {
    info!(url, "fetching listing page");
    fetcher
        .get_text(url)
        .await
        .map_err(|source: FetchError| CrawlError::ListingFetch {
            url: url.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.ced-qc.ca/fr/registres-publics/liste";

    fn tuples(listing: &Listing) -> Vec<(String, String, String)> {
        listing
            .persons
            .iter()
            .flat_map(|p| {
                p.documents
                    .iter()
                    .map(|d| (p.display_name.clone(), d.id.clone(), d.year_label.clone()))
            })
            .collect()
    }

    const PRIMARY: &str = r#"
<html><body>
<div class="texte_contenuStructure">
  <div>
    <ul>
      <li>A
        <ul>
          <li>Anglade, Dominique <span>(Saint-Henri-Sainte-Anne)</span>
            <ul>
              <li><a href="/storage/docs/101.pdf" data-id-document="101">Sommaire 2022-2023</a></li>
              <li><a href="/storage/docs/88.pdf" data-id-document="88">Sommaire 2021-2022</a></li>
            </ul>
          </li>
          <li>Arseneau, Joël
            <ul>
              <li><a href="https://cdn.example.org/55.pdf" data-id-document="55">Sommaire 2020</a></li>
            </ul>
          </li>
        </ul>
      </li>
      <li>B
        <ul>
          <li>Bérubé, Pascal (Matane-Matapédia)
            <ul>
              <li><a href="/storage/docs/7.pdf" data-id-document="7">Sommaire 2019-2020</a></li>
            </ul>
          </li>
        </ul>
      </li>
    </ul>
  </div>
</div>
</body></html>"#;

    #[test]
    fn primary_layout_in_page_order() {
        let listing = parse_listing(PRIMARY, BASE);
        assert_eq!(listing.strategy, Some("primary"));
        assert!(listing.rejected.is_empty());
        assert_eq!(
            tuples(&listing),
            vec![
                ("Anglade, Dominique (Saint-Henri-Sainte-Anne)".into(), "101".into(), "2022-2023".into()),
                ("Anglade, Dominique (Saint-Henri-Sainte-Anne)".into(), "88".into(), "2021-2022".into()),
                ("Arseneau, Joël".into(), "55".into(), "2020".into()),
                ("Bérubé, Pascal (Matane-Matapédia)".into(), "7".into(), "2019-2020".into()),
            ]
        );
    }

    #[test]
    fn documents_get_absolute_urls_and_filenames() {
        let listing = parse_listing(PRIMARY, BASE);
        let first = &listing.persons[0];
        assert_eq!(first.sanitized_name, "Anglade,_Dominique_Saint-Henri-Sainte-Anne");
        assert_eq!(first.documents[0].source_url, "https://www.ced-qc.ca/storage/docs/101.pdf");
        assert_eq!(first.documents[0].local_filename, "document_101_2022-2023.pdf");
        assert_eq!(listing.persons[1].documents[0].source_url, "https://cdn.example.org/55.pdf");
    }

    #[test]
    fn falls_back_when_container_is_renamed() {
        let html = PRIMARY.replace("texte_contenuStructure", "contenu");
        let listing = parse_listing(&html, BASE);
        assert_eq!(listing.strategy, Some("nested-list"));
        let names: Vec<_> = listing.persons.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Anglade, Dominique (Saint-Henri-Sainte-Anne)",
                "Arseneau, Joël",
                "Bérubé, Pascal (Matane-Matapédia)"
            ]
        );
        assert_eq!(tuples(&listing).len(), 4);
    }

    #[test]
    fn bad_rows_do_not_stop_the_rest() {
        let html = r#"
<div class="texte_contenuStructure"><div><ul><li>A<ul>
  <li><span></span><ul><li><a href="/x.pdf" data-id-document="1">2020</a></li></ul></li>
  <li>Sans Documents<ul><li>rien</li></ul></li>
  <li>Bon, Élu<ul><li><a href="/y.pdf" data-id-document="2">Sommaire 2023-2024</a></li></ul></li>
</ul></li></ul></div></div>"#;
        let listing = parse_listing(html, BASE);
        assert_eq!(listing.rejected.len(), 2);
        assert_eq!(
            tuples(&listing),
            vec![("Bon, Élu".into(), "2".into(), "2023-2024".into())]
        );
    }

    #[test]
    fn link_fallbacks_and_missing_attributes() {
        let html = r#"
<div class="texte_contenuStructure"><div><ul><li>A<ul>
  <li>Sans Liste<ul></ul><div><a href="/docs/9.PDF">Déclaration</a><a href="/about">x</a></div></li>
  <li>Avec Id<ul><li><a href="/z.pdf" data-id-document="">Sommaire 2018</a><a>sans lien</a></li></ul></li>
</ul></li></ul></div></div>"#;
        let listing = parse_listing(html, BASE);
        assert!(listing.rejected.is_empty());

        let sans = &listing.persons[0];
        assert_eq!(sans.documents.len(), 1);
        assert_eq!(sans.documents[0].id, "unknown");
        assert_eq!(sans.documents[0].year_label, "unknown");

        let avec = &listing.persons[1];
        assert_eq!(avec.documents.len(), 1);
        assert_eq!(avec.documents[0].local_filename, "document_unknown_2018.pdf");
    }

    #[test]
    fn no_rows_at_all() {
        let listing = parse_listing("<html><body><p>maintenance</p></body></html>", BASE);
        assert!(listing.strategy.is_none());
        assert!(listing.persons.is_empty());
    }

    #[test]
    fn year_label_from_filename() {
        assert_eq!(year_label_of("document_7_2022-2023.pdf"), Some("2022-2023"));
        assert_eq!(year_label_of("document_2021_2019.pdf"), Some("2019"));
        assert_eq!(year_label_of("document_12345_unknown.pdf"), Some("unknown"));
        assert_eq!(year_label_of("notes.pdf"), None);
        let doc = DocumentRef::new("88", "2021-2022", "https://x/88.pdf");
        assert_eq!(year_label_of(&doc.local_filename), Some("2021-2022"));
    }

    #[test]
    fn snippets_for_debugging() {
        assert_eq!(container_snippets(PRIMARY).len(), 1);
    }
}
