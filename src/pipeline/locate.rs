//! Page location: pull the document descriptor out of rendered markup.
//!
//! The viewer publishes everything we need in two places once its script has
//! run: a `<meta name="description">` whose content reads like
//! `"Title: Annual Report, Author: ACME, Length: 48 pages, Published: …"`,
//! and an `<img class="page">` element pointing at the first page asset.
//! Right after navigation neither exists, so [`LocateError::NotReady`] is the
//! normal answer for the first few polls.

use crate::error::LocateError;
use crate::output::{DocumentDescriptor, DEFAULT_TITLE};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

static DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="description"]"#).expect("valid description selector")
});

static PAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img.page").expect("valid page selector"));

/// `Title: <title>, Author…`: the title runs to `, Author` or the end.
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)Title:(.*?)(?:, Author|$)").expect("valid title regex"));

/// `Length: <n> pages`: the count runs to ` pages` or the end.
static LENGTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)Length:(.*?)(?: pages|$)").expect("valid length regex"));

/// Extract the document descriptor from rendered markup.
///
/// Returns the full descriptor or an error; never a partial result.
pub fn locate(markup: &str) -> Result<DocumentDescriptor, LocateError> {
    let document = Html::parse_document(markup);

    let description = document
        .select(&DESCRIPTION_SELECTOR)
        .find_map(|el| el.value().attr("content"))
        .ok_or(LocateError::NotReady)?;

    let title = parse_title(description);
    let page_count = parse_length(description)?;

    let sample_page_location = document
        .select(&PAGE_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .ok_or(LocateError::MissingPageElement)?
        .to_string();

    debug!(
        "Located '{}' ({} pages), first page at {}",
        title, page_count, sample_page_location
    );

    Ok(DocumentDescriptor {
        title,
        page_count,
        sample_page_location,
    })
}

fn parse_title(description: &str) -> String {
    TITLE_RE
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string()
}

fn parse_length(description: &str) -> Result<usize, LocateError> {
    let raw = LENGTH_RE
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .ok_or(LocateError::MissingLength)?;

    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(LocateError::InvalidLength {
            raw: raw.to_string(),
        }),
    }
}
