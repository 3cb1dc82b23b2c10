//! Document download orchestration.
//!
//! One call to [`download`] takes a document URL through the whole pipeline:
//!
//! ```text
//! navigate ─▶ poll/locate ─▶ expand ─▶ fetch ─▶ assemble ─▶ cleanup
//! (browser)   (metadata)    (URLs)    (HTTP)   (PDF)       (optional)
//! ```
//!
//! Every stage runs to completion before the next starts. The browser
//! session only lives for the polling phase and is closed on every exit
//! path, including poll timeouts and malformed documents.

use crate::browser::{ChromeSession, MarkupSource};
use crate::config::DownloadConfig;
use crate::error::{FlipbookError, LocateError};
use crate::output::{DocumentDescriptor, DownloadOutput, DownloadStats};
use crate::pipeline::scratch::ScratchDir;
use crate::pipeline::{assemble, expand, fetch, locate};
use reqwest::Url;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Download a flipbook document and assemble it into `<title>.pdf`.
///
/// This is the primary entry point for the library. It launches a headless
/// Chromium for the metadata phase.
///
/// # Returns
/// `Ok(DownloadOutput)` once a PDF has been written, even if some pages were
/// missing (check `output.stats.missing_pages`, or call
/// [`DownloadOutput::into_result`]).
///
/// # Errors
/// Returns `Err(FlipbookError)` only for fatal errors:
/// - the browser could not be started or the page not opened
/// - metadata never appeared, or the page is not a supported flipbook
/// - no page could be fetched or decoded
/// - cleanup was requested and failed
pub async fn download(
    url: impl AsRef<str>,
    config: &DownloadConfig,
) -> Result<DownloadOutput, FlipbookError> {
    let url = url.as_ref();
    parse_document_url(url)?;
    let session = ChromeSession::launch(config).await?;
    download_with(session, url, config).await
}

/// Run the pipeline with a caller-provided [`MarkupSource`].
///
/// `source` is consumed: it is closed as soon as the metadata phase ends.
pub async fn download_with<S: MarkupSource>(
    source: S,
    url: &str,
    config: &DownloadConfig,
) -> Result<DownloadOutput, FlipbookError> {
    let total_start = Instant::now();
    let base = parse_document_url(url)?;
    info!("Processing document: {}", url);
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(url);
    }

    // ── Step 1: Wait for the rendered metadata ───────────────────────────
    let (descriptor, poll_attempts) = acquire_descriptor(source, url, config).await?;
    let descriptor = descriptor.resolve_against(&base)?;
    info!(
        "Title: {} | Pages: {} | First page: {}",
        descriptor.title, descriptor.page_count, descriptor.sample_page_location
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_metadata(&descriptor);
    }

    // ── Step 2: Derive every page location ───────────────────────────────
    let sample = if config.raster_only {
        expand::force_extension(&descriptor.sample_page_location, &config.raster_extension)?
    } else {
        descriptor.sample_page_location.clone()
    };
    let locations = expand::expand(&sample, descriptor.page_count)?;
    debug!("Derived {} page locations", locations.len());

    // ── Step 3: Fetch pages ──────────────────────────────────────────────
    let stem = descriptor.file_stem();
    let scratch = ScratchDir::create(&config.scratch_dir, &stem).await?;
    let client = fetch::build_client(config)?;

    let fetch_start = Instant::now();
    let report = fetch::fetch_all(&client, &locations, &scratch, config).await;
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;

    let assets = report.assets();
    info!(
        "Fetched {}/{} pages in {}ms",
        assets.len(),
        locations.len(),
        fetch_duration_ms
    );
    if assets.is_empty() {
        return Err(FlipbookError::NoPagesFetched {
            expected: locations.len(),
            first_error: report
                .first_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    // ── Step 4: Assemble the PDF ─────────────────────────────────────────
    let output_path = config.output_dir.join(format!("{stem}.pdf"));
    let assemble_start = Instant::now();
    let assembly = assemble::assemble(&assets, &output_path, config).await?;
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;

    let fetched_pages = report.fetched_count();
    let reused_pages = report.reused_count();
    let mut pages = report.outcomes;
    for err in assembly.skipped {
        if let Some(outcome) = pages.iter_mut().find(|o| o.index == err.page()) {
            outcome.error = Some(err);
        }
    }

    // ── Step 5: Optional cleanup ─────────────────────────────────────────
    if config.cleanup {
        scratch.remove().await?;
    }

    // ── Step 6: Reconcile expected vs. assembled pages ───────────────────
    let missing_pages: Vec<usize> = (1..=descriptor.page_count)
        .filter(|i| assembly.assembled.binary_search(i).is_err())
        .collect();
    if !missing_pages.is_empty() {
        warn!(
            "'{}': {} of {} pages missing from the PDF: {:?}",
            descriptor.title,
            missing_pages.len(),
            descriptor.page_count,
            missing_pages
        );
    }

    let stats = DownloadStats {
        expected_pages: descriptor.page_count,
        fetched_pages,
        reused_pages,
        assembled_pages: assembly.pages_written,
        missing_pages,
        poll_attempts,
        fetch_duration_ms,
        assemble_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Saved '{}' ({}/{} pages, {}ms)",
        output_path.display(),
        stats.assembled_pages,
        stats.expected_pages,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(&stats);
    }

    Ok(DownloadOutput {
        source_url: url.to_string(),
        descriptor,
        output_path,
        pages,
        stats,
    })
}

/// Download every URL in order, one document fully before the next.
///
/// A failing document does not stop the worklist; each URL gets its own
/// result.
pub async fn download_all<I, U>(
    urls: I,
    config: &DownloadConfig,
) -> Vec<(String, Result<DownloadOutput, FlipbookError>)>
where
    I: IntoIterator<Item = U>,
    U: AsRef<str>,
{
    let mut results = Vec::new();
    for url in urls {
        let url = url.as_ref().to_string();
        let result = download(&url, config).await;
        if let Err(ref e) = result {
            warn!("Failed to download {}: {}", url, e);
        }
        results.push((url, result));
    }
    results
}

/// Synchronous wrapper around [`download`].
///
/// Creates a temporary tokio runtime internally.
pub fn download_sync(
    url: impl AsRef<str>,
    config: &DownloadConfig,
) -> Result<DownloadOutput, FlipbookError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlipbookError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(download(url, config))
}

/// Locate a document's metadata without fetching any page.
pub async fn inspect(
    url: impl AsRef<str>,
    config: &DownloadConfig,
) -> Result<DocumentDescriptor, FlipbookError> {
    let url = url.as_ref();
    let base = parse_document_url(url)?;
    let session = ChromeSession::launch(config).await?;
    inspect_with(session, url, config, &base).await
}

async fn inspect_with<S: MarkupSource>(
    source: S,
    url: &str,
    config: &DownloadConfig,
    base: &Url,
) -> Result<DocumentDescriptor, FlipbookError> {
    let (descriptor, _) = acquire_descriptor(source, url, config).await?;
    descriptor.resolve_against(base)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Accept only absolute HTTP/HTTPS URLs.
fn parse_document_url(url: &str) -> Result<Url, FlipbookError> {
    Url::parse(url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| FlipbookError::InvalidUrl {
            input: url.to_string(),
        })
}

/// Navigate, poll until the metadata is located, and close the session
/// whatever the outcome.
async fn acquire_descriptor<S: MarkupSource>(
    mut source: S,
    url: &str,
    config: &DownloadConfig,
) -> Result<(DocumentDescriptor, u32), FlipbookError> {
    let result = match source.navigate(url).await {
        Ok(()) => poll_for_descriptor(&mut source, url, config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = source.close().await {
        warn!("Failed to close browser session: {}", e);
    }
    result
}

/// The bounded polling loop.
///
/// Transient states ("not rendered yet") are retried until `max_polls`;
/// malformed states fail once they persist for `malformed_grace_polls`
/// consecutive polls.
async fn poll_for_descriptor<S: MarkupSource>(
    source: &mut S,
    url: &str,
    config: &DownloadConfig,
) -> Result<(DocumentDescriptor, u32), FlipbookError> {
    let interval = Duration::from_millis(config.poll_interval_ms);
    let mut malformed_streak = 0u32;
    let mut last_error = LocateError::NotReady;

    for attempt in 1..=config.max_polls {
        tokio::time::sleep(interval).await;
        let markup = source.markup().await?;

        match locate::locate(&markup) {
            Ok(descriptor) => {
                debug!("Metadata located after {} polls", attempt);
                return Ok((descriptor, attempt));
            }
            Err(e) if e.is_transient() => {
                debug!("Poll {}/{}: {}", attempt, config.max_polls, e);
                malformed_streak = 0;
                last_error = e;
            }
            Err(e) => {
                malformed_streak += 1;
                debug!(
                    "Poll {}/{}: {} ({}/{} before giving up)",
                    attempt, config.max_polls, e, malformed_streak, config.malformed_grace_polls
                );
                if malformed_streak >= config.malformed_grace_polls {
                    return Err(FlipbookError::MalformedDocument {
                        url: url.to_string(),
                        source: e,
                    });
                }
                last_error = e;
            }
        }
    }

    Err(FlipbookError::MetadataTimeout {
        url: url.to_string(),
        attempts: config.max_polls,
        last_error,
    })
}
