//! Result types produced by the download pipeline.

use crate::error::{FlipbookError, PageError};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder title for documents whose description carries none.
pub const DEFAULT_TITLE: &str = "Untitled Flipbook";

/// What the Page Locator learned about a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub title: String,
    /// Always ≥ 1.
    pub page_count: usize,
    /// Location of page 1, as observed in the rendered markup.
    pub sample_page_location: String,
}

impl DocumentDescriptor {
    /// Resolve a relative or protocol-relative sample location against the
    /// document URL. Absolute locations are returned unchanged.
    pub fn resolve_against(&self, base: &Url) -> Result<Self, FlipbookError> {
        let resolved =
            base.join(&self.sample_page_location)
                .map_err(|_| FlipbookError::InvalidUrl {
                    input: self.sample_page_location.clone(),
                })?;
        Ok(Self {
            sample_page_location: resolved.to_string(),
            ..self.clone()
        })
    }

    /// The title made safe for use as a file or directory name.
    pub fn file_stem(&self) -> String {
        let cleaned: String = self
            .title
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let cleaned = cleaned.trim().trim_end_matches('.').trim();
        if cleaned.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            cleaned.to_string()
        }
    }
}

/// How a stored page must be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetFormat {
    /// PNG, JPEG, … decoded directly.
    Raster,
    /// SVG / SVGZ, rasterised before assembly.
    Vector,
}

impl AssetFormat {
    /// Classify a file by its extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("svg") | Some("svgz") => AssetFormat::Vector,
            _ => AssetFormat::Raster,
        }
    }
}

/// A page stored in the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAsset {
    /// 1-indexed page number.
    pub index: usize,
    pub path: PathBuf,
    pub format: AssetFormat,
}

impl LocalAsset {
    pub fn new(index: usize, path: PathBuf) -> Self {
        let format = AssetFormat::from_path(&path);
        Self {
            index,
            path,
            format,
        }
    }
}

/// What happened to one page location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub index: usize,
    pub location: String,
    /// Present when the page was stored.
    pub asset: Option<LocalAsset>,
    /// True when the stored file came from a previous run.
    pub reused: bool,
    /// Present when the page could not be fetched or decoded.
    pub error: Option<PageError>,
}

/// Counters and timings for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Page count announced by the document.
    pub expected_pages: usize,
    /// Pages stored in the scratch directory (fetched or reused).
    pub fetched_pages: usize,
    /// Pages reused from a previous run.
    pub reused_pages: usize,
    /// Pages in the output PDF.
    pub assembled_pages: usize,
    /// 1-indexed pages absent from the output PDF.
    pub missing_pages: Vec<usize>,
    /// Metadata polls needed before the document was located.
    pub poll_attempts: u32,
    pub fetch_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The outcome of downloading one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutput {
    pub source_url: String,
    pub descriptor: DocumentDescriptor,
    pub output_path: PathBuf,
    pub pages: Vec<PageOutcome>,
    pub stats: DownloadStats,
}

impl DownloadOutput {
    /// Whether every announced page made it into the PDF.
    pub fn is_complete(&self) -> bool {
        self.stats.missing_pages.is_empty()
    }

    /// Treat any missing page as an error.
    pub fn into_result(self) -> Result<Self, FlipbookError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(FlipbookError::PartialDownload {
                title: self.descriptor.title.clone(),
                assembled: self.stats.assembled_pages,
                missing: self.stats.missing_pages.len(),
                expected: self.stats.expected_pages,
            })
        }
    }
}
