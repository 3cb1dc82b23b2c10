//! Location expansion: derive every page location from the first one.
//!
//! Page assets follow a fixed naming scheme, e.g.
//! `https://p.example.com/1a2b/p1.svgz?_token_=…` for page 1 and
//! `…/p17.svgz?_token_=…` for page 17. Only the page index between the `p`
//! and the `.` changes; the extension and any signed query string stay put.

use crate::error::FlipbookError;

/// The substring that encodes page 1 in a page location.
pub const FIRST_PAGE_MARKER: &str = "p1.";

/// Split `sample` around its first-page marker.
///
/// The last marker before the query string is used, so a host such as
/// `sp1.example.com` or a `p1.` inside a token never matches.
fn split_at_marker(sample: &str) -> Result<(&str, &str), FlipbookError> {
    let path_end = sample.find('?').unwrap_or(sample.len());
    let pos = sample[..path_end]
        .rfind(FIRST_PAGE_MARKER)
        .ok_or_else(|| FlipbookError::PatternNotFound {
            location: sample.to_string(),
        })?;
    Ok((&sample[..pos], &sample[pos + FIRST_PAGE_MARKER.len()..]))
}

/// Derive `count` ordered page locations from the location of page 1.
///
/// Element `i - 1` of the result is the location of page `i`.
pub fn expand(sample: &str, count: usize) -> Result<Vec<String>, FlipbookError> {
    let (prefix, suffix) = split_at_marker(sample)?;
    Ok((1..=count)
        .map(|i| format!("{prefix}p{i}.{suffix}"))
        .collect())
}

/// Replace the extension after the marker, keeping any query string.
///
/// `…/p1.svgz?t=1` with `jpg` becomes `…/p1.jpg?t=1`.
pub fn force_extension(sample: &str, ext: &str) -> Result<String, FlipbookError> {
    let (prefix, suffix) = split_at_marker(sample)?;
    let query = suffix.find('?').map(|q| &suffix[q..]).unwrap_or("");
    Ok(format!("{prefix}{FIRST_PAGE_MARKER}{ext}{query}"))
}
