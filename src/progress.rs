//! Progress-callback trait for per-page download events.
//!
//! Inject an [`Arc<dyn DownloadProgressCallback>`] via
//! [`crate::config::DownloadConfigBuilder::progress_callback`] to receive
//! events as the pipeline fetches and assembles each page.
//!
//! # Example
//!
//! ```rust
//! use flipbook2pdf::{DownloadProgressCallback, DownloadConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     fetched: AtomicUsize,
//! }
//!
//! impl DownloadProgressCallback for CountingCallback {
//!     fn on_page_fetched(&self, index: usize, total: usize, bytes: u64, _reused: bool) {
//!         self.fetched.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} stored ({} bytes)", index, total, bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { fetched: AtomicUsize::new(0) });
//!
//! let config = DownloadConfig::builder()
//!     .progress_callback(counter as Arc<dyn DownloadProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{DocumentDescriptor, DownloadStats};
use std::sync::Arc;

/// Called by the download pipeline as it works through a document.
///
/// Implementations must be `Send + Sync`: with `fetch_concurrency > 1` the
/// fetch events may arrive from several tasks. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait DownloadProgressCallback: Send + Sync {
    /// Called before the browser session is opened for `url`.
    fn on_document_start(&self, url: &str) {
        let _ = url;
    }

    /// Called once the document metadata has been located.
    fn on_metadata(&self, descriptor: &DocumentDescriptor) {
        let _ = descriptor;
    }

    /// Called once before the first page request.
    ///
    /// # Arguments
    /// * `total_pages` — number of page locations that will be attempted
    fn on_fetch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page has been stored (or reused from a previous run).
    ///
    /// # Arguments
    /// * `index`  — 1-indexed page number
    /// * `total`  — total pages attempted
    /// * `bytes`  — size of the stored file
    /// * `reused` — true when the file already existed and was not fetched
    fn on_page_fetched(&self, index: usize, total: usize, bytes: u64, reused: bool) {
        let _ = (index, total, bytes, reused);
    }

    /// Called when a page could not be fetched; the page is skipped.
    fn on_page_failed(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once before the first page is decoded for the PDF.
    fn on_assemble_start(&self, total_assets: usize) {
        let _ = total_assets;
    }

    /// Called after each page is added to the PDF.
    fn on_page_assembled(&self, index: usize, total_assets: usize) {
        let _ = (index, total_assets);
    }

    /// Called once after the PDF is written (and scratch cleaned up).
    fn on_document_complete(&self, stats: &DownloadStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DownloadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DownloadConfig`].
pub type ProgressCallback = Arc<dyn DownloadProgressCallback>;
