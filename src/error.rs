//! Error types for the flipbook2pdf library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`FlipbookError`] — **Fatal**: the document cannot be produced at all
//!   (browser would not start, the page never rendered its metadata, the
//!   sample page location has no recognisable page marker, cleanup was
//!   obstructed). Returned as `Err(FlipbookError)` from the `download*`
//!   functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page could not be fetched or
//!   decoded. Stored inside [`crate::output::PageOutcome`]; the page is simply
//!   omitted from the assembled PDF.
//!
//! * [`LocateError`] — **Expected**: the rendered markup does not (yet)
//!   carry the document metadata. Drives the polling loop in
//!   [`crate::download`] and only becomes fatal once the poll budget is spent
//!   or the page is clearly malformed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the flipbook2pdf library.
#[derive(Debug, Error)]
pub enum FlipbookError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input string is not a valid HTTP/HTTPS URL.
    #[error("Invalid document URL '{input}': expected an HTTP/HTTPS URL")]
    InvalidUrl { input: String },

    // ── Browser errors ────────────────────────────────────────────────────
    /// The headless browser could not be started.
    #[error(
        "Failed to launch headless browser: {0}\n\
Make sure Chrome or Chromium is installed, or pass its path with --chrome."
    )]
    BrowserLaunch(String),

    /// Navigation to the document page failed.
    #[error("Failed to open '{url}' in the browser: {reason}")]
    Navigation { url: String, reason: String },

    /// The rendered markup could not be read from the browser.
    #[error("Failed to read rendered page for '{url}': {reason}")]
    MarkupUnavailable { url: String, reason: String },

    /// The page never exposed its metadata within the poll budget.
    #[error(
        "Document metadata for '{url}' did not appear after {attempts} polls.\n\
Last state: {last_error}\nIncrease --max-polls if the viewer is slow to render."
    )]
    MetadataTimeout {
        url: String,
        attempts: u32,
        last_error: LocateError,
    },

    /// The page rendered, but its metadata is permanently unusable.
    #[error("Document page '{url}' is not a supported flipbook: {source}")]
    MalformedDocument {
        url: String,
        #[source]
        source: LocateError,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The sample page location carries no first-page marker.
    #[error("No first-page marker 'p1.' found in page location '{location}'")]
    PatternNotFound { location: String },

    /// The scratch directory could not be created.
    #[error("Failed to prepare scratch directory '{path}': {source}")]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every page fetch failed; there is nothing to assemble.
    #[error("All {expected} page downloads failed.\nFirst error: {first_error}")]
    NoPagesFetched { expected: usize, first_error: String },

    /// Pages were fetched but none of them could be decoded.
    #[error("None of the {fetched} downloaded pages could be decoded.\nFirst error: {first_error}")]
    NoPagesAssembled { fetched: usize, first_error: String },

    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    /// A scratch file or directory could not be removed.
    #[error("Cleanup failed for '{path}': {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some pages are missing from the assembled document.
    ///
    /// Returned by [`crate::output::DownloadOutput::into_result`] when the
    /// caller wants to treat any missing page as an error.
    #[error("{missing}/{expected} pages missing from '{title}'")]
    PartialDownload {
        title: String,
        assembled: usize,
        missing: usize,
        expected: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why the rendered markup did not yield a [`crate::output::DocumentDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    /// No description metadata yet; the viewer script has not run.
    #[error("document description not rendered yet")]
    NotReady,

    /// The description has no `Length: N pages` field.
    #[error("document description has no page count")]
    MissingLength,

    /// The `Length:` field is not a positive integer.
    #[error("document page count '{raw}' is not a positive integer")]
    InvalidLength { raw: String },

    /// No `<img class="page">` element (or it has no `src`).
    #[error("no page image element found")]
    MissingPageElement,
}

impl LocateError {
    /// Whether more rendering time could still fix this.
    ///
    /// The page image element is injected by script after the description is
    /// already present, so its absence is not a sign of a broken document.
    pub fn is_transient(&self) -> bool {
        matches!(self, LocateError::NotReady | LocateError::MissingPageElement)
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Connection or protocol error while fetching the page.
    #[error("Page {page}: download failed: {detail}")]
    Transport { page: usize, detail: String },

    /// The request exceeded the per-page timeout.
    #[error("Page {page}: download timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The server answered with a non-success status.
    #[error("Page {page}: server returned HTTP {status}")]
    HttpStatus { page: usize, status: u16 },

    /// The payload could not be written to the scratch directory.
    #[error("Page {page}: failed to store download: {detail}")]
    Write { page: usize, detail: String },

    /// The stored image could not be decoded or rasterised.
    #[error("Page {page}: image could not be decoded: {detail}")]
    Decode { page: usize, detail: String },
}

impl PageError {
    /// The 1-indexed page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Transport { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::HttpStatus { page, .. }
            | PageError::Write { page, .. }
            | PageError::Decode { page, .. } => *page,
        }
    }
}
