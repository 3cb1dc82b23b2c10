//! Page fetching: download every page location into the scratch directory.
//!
//! A page that cannot be fetched is logged and skipped; it never aborts the
//! batch. Requests are issued `fetch_concurrency` at a time (one by default)
//! and results are collected with `buffered`, so the outcome list is always
//! in page order regardless of which request finishes first.

use crate::config::DownloadConfig;
use crate::error::{FlipbookError, PageError};
use crate::output::{LocalAsset, PageOutcome};
use crate::pipeline::scratch::ScratchDir;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Extension used when a location has none we can recognise.
const FALLBACK_EXTENSION: &str = "img";

/// Every page outcome of one fetch run, in page order.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub outcomes: Vec<PageOutcome>,
}

impl FetchReport {
    /// Stored pages in ascending index order.
    pub fn assets(&self) -> Vec<LocalAsset> {
        self.outcomes
            .iter()
            .filter_map(|o| o.asset.clone())
            .collect()
    }

    /// 1-indexed pages that could not be fetched.
    pub fn missing(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| o.asset.is_none())
            .map(|o| o.index)
            .collect()
    }

    pub fn fetched_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.asset.is_some()).count()
    }

    pub fn reused_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.reused).count()
    }

    pub fn first_error(&self) -> Option<&PageError> {
        self.outcomes.iter().find_map(|o| o.error.as_ref())
    }
}

/// Build the HTTP client shared by every page request of a document.
pub fn build_client(config: &DownloadConfig) -> Result<reqwest::Client, FlipbookError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FlipbookError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Fetch every location into `scratch`.
///
/// Location `i` (0-based) is stored as page `i + 1`.
pub async fn fetch_all(
    client: &reqwest::Client,
    locations: &[String],
    scratch: &ScratchDir,
    config: &DownloadConfig,
) -> FetchReport {
    let total = locations.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_fetch_start(total);
    }

    let outcomes = stream::iter(locations.iter().enumerate().map(|(i, location)| {
        let index = i + 1;
        async move {
            let (outcome, bytes) = fetch_page(client, index, location, scratch, config).await;
            if let Some(ref cb) = config.progress_callback {
                match &outcome.error {
                    None => cb.on_page_fetched(index, total, bytes, outcome.reused),
                    Some(e) => cb.on_page_failed(index, total, &e.to_string()),
                }
            }
            outcome
        }
    }))
    // Fields are public, so a literal config can bypass the builder's clamp.
    .buffered(config.fetch_concurrency.max(1))
    .collect()
    .await;

    FetchReport { outcomes }
}

/// Fetch (or reuse) a single page. Returns the outcome and the stored size.
async fn fetch_page(
    client: &reqwest::Client,
    index: usize,
    location: &str,
    scratch: &ScratchDir,
    config: &DownloadConfig,
) -> (PageOutcome, u64) {
    let ext = extension_of(location);
    let path = scratch.page_path(index, &ext);

    if config.skip_existing {
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() && meta.len() > 0 {
                debug!("Reusing page {} from {}", index, path.display());
                let outcome = PageOutcome {
                    index,
                    location: location.to_string(),
                    asset: Some(LocalAsset::new(index, path)),
                    reused: true,
                    error: None,
                };
                return (outcome, meta.len());
            }
        }
    }

    match download_to(client, index, location, &path, config.request_timeout_secs).await {
        Ok(bytes) => {
            debug!("Fetched page {} → {} ({} bytes)", index, path.display(), bytes);
            let outcome = PageOutcome {
                index,
                location: location.to_string(),
                asset: Some(LocalAsset::new(index, path)),
                reused: false,
                error: None,
            };
            (outcome, bytes)
        }
        Err(e) => {
            warn!("Failed to download page {}: {}", index, e);
            let outcome = PageOutcome {
                index,
                location: location.to_string(),
                asset: None,
                reused: false,
                error: Some(e),
            };
            (outcome, 0)
        }
    }
}

/// GET `location` and store the body at `path`.
///
/// The body is written next to the target and renamed into place, so an
/// interrupted write never leaves a file that `skip_existing` would reuse.
async fn download_to(
    client: &reqwest::Client,
    page: usize,
    location: &str,
    path: &Path,
    timeout_secs: u64,
) -> Result<u64, PageError> {
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            PageError::Timeout {
                page,
                secs: timeout_secs,
            }
        } else {
            PageError::Transport {
                page,
                detail: e.to_string(),
            }
        }
    };

    let response = client.get(location).send().await.map_err(classify)?;

    if !response.status().is_success() {
        return Err(PageError::HttpStatus {
            page,
            status: response.status().as_u16(),
        });
    }

    let bytes = response.bytes().await.map_err(classify)?;

    let part_path = path.with_extension("part");
    let write_err = |e: std::io::Error| PageError::Write {
        page,
        detail: e.to_string(),
    };
    tokio::fs::write(&part_path, &bytes)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&part_path, path)
        .await
        .map_err(write_err)?;

    Ok(bytes.len() as u64)
}

/// Extension of the last path segment of `location`, ignoring any query
/// string or fragment.
pub fn extension_of(location: &str) -> String {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}
