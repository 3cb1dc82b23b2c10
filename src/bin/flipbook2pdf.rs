//! CLI binary for flipbook2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DownloadConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use flipbook2pdf::{
    download, inspect, DocumentDescriptor, DownloadConfig, DownloadProgressCallback,
    DownloadStats, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per document, switching from a
/// spinner (waiting for the viewer to render) to a page counter (fetching,
/// then assembling).
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(ref bar) = *guard {
                f(bar);
            }
        }
    }

    fn counter_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS)
    }

    /// Drop the current bar, e.g. when a document failed before completing.
    fn clear(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn switch_to_counter(&self, prefix: &'static str, total: usize) {
        self.with_bar(|bar| {
            bar.set_style(Self::counter_style());
            bar.set_length(total as u64);
            bar.set_position(0);
            bar.set_prefix(prefix);
            bar.reset_eta();
        });
    }
}

impl DownloadProgressCallback for CliProgressCallback {
    fn on_document_start(&self, url: &str) {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Rendering");
        bar.set_message(format!("Waiting for viewer metadata… {}", dim(url)));
        bar.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_metadata(&self, d: &DocumentDescriptor) {
        self.with_bar(|bar| {
            bar.println(format!(
                "{} {}  {}",
                cyan("◆"),
                bold(&d.title),
                dim(&format!("{} pages", d.page_count))
            ));
        });
    }

    fn on_fetch_start(&self, total_pages: usize) {
        self.switch_to_counter("Downloading", total_pages);
    }

    fn on_page_fetched(&self, _index: usize, _total: usize, _bytes: u64, _reused: bool) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_page_failed(&self, index: usize, total: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.with_bar(|bar| {
            bar.println(format!(
                "  {} Page {:>3}/{:<3}  {}",
                red("✗"),
                index,
                total,
                red(&msg)
            ));
            bar.inc(1);
        });
    }

    fn on_assemble_start(&self, total_assets: usize) {
        self.switch_to_counter("Assembling", total_assets);
    }

    fn on_page_assembled(&self, _index: usize, _total: usize) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_document_complete(&self, _stats: &DownloadStats) {
        self.clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Download one document to ./<title>.pdf
  flipbook2pdf https://viewer.example.com/read/000123

  # Several documents, raster pages only, remove scratch files afterwards
  flipbook2pdf --raster-only --cleanup URL1 URL2 URL3

  # Resume an interrupted run, reusing pages already in ./downloads
  flipbook2pdf --skip-existing https://viewer.example.com/read/000123

  # Only print title, page count and first page location
  flipbook2pdf --inspect-only --json https://viewer.example.com/read/000123

  # Fail (exit 1) when any page is missing from the PDF
  flipbook2pdf --strict https://viewer.example.com/read/000123

FILES:
  <scratch-dir>/<title>/page_<N>.<ext>   downloaded pages (default: downloads/)
  <output-dir>/<title>.pdf               assembled document (default: ./)

ENVIRONMENT VARIABLES:
  RUST_LOG                 Override log filter (e.g. flipbook2pdf=debug)
  FLIPBOOK2PDF_CHROME      Path to Chrome/Chromium
  FLIPBOOK2PDF_OUTPUT_DIR  Output directory
"#;

/// Download flipbook documents and assemble their pages into PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "flipbook2pdf",
    version,
    about = "Download flipbook documents and assemble their pages into PDFs",
    long_about = "Open each flipbook document URL in a headless browser, wait for the viewer \
to publish its title, page count and first page image, then download every page and \
assemble them into <title>.pdf.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document URLs, processed one after another.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Fetch raster pages even when the viewer serves SVG/SVGZ.
    #[arg(long, env = "FLIPBOOK2PDF_RASTER_ONLY")]
    raster_only: bool,

    /// Extension requested in raster-only mode.
    #[arg(long, env = "FLIPBOOK2PDF_RASTER_EXTENSION", default_value = "jpg")]
    raster_extension: String,

    /// Remove the scratch directory after each PDF is written.
    #[arg(long, env = "FLIPBOOK2PDF_CLEANUP")]
    cleanup: bool,

    /// Reuse pages already present in the scratch directory.
    #[arg(long, env = "FLIPBOOK2PDF_SKIP_EXISTING")]
    skip_existing: bool,

    /// Scratch directory root.
    #[arg(long, env = "FLIPBOOK2PDF_SCRATCH_DIR", default_value = "downloads")]
    scratch_dir: PathBuf,

    /// Directory for the assembled PDFs.
    #[arg(short, long, env = "FLIPBOOK2PDF_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Per-page HTTP timeout in seconds.
    #[arg(long, env = "FLIPBOOK2PDF_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    /// Page requests in flight at once.
    #[arg(short, long, env = "FLIPBOOK2PDF_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Delay between metadata polls in milliseconds.
    #[arg(long, env = "FLIPBOOK2PDF_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Give up on a document after this many metadata polls.
    #[arg(long, env = "FLIPBOOK2PDF_MAX_POLLS", default_value_t = 60)]
    max_polls: u32,

    /// Points drawn past each page edge to crop thin borders.
    #[arg(long, env = "FLIPBOOK2PDF_OVERSCAN", default_value_t = 0.0)]
    overscan: f32,

    /// Path to a Chrome/Chromium executable.
    #[arg(long, env = "FLIPBOOK2PDF_CHROME")]
    chrome: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long)]
    headful: bool,

    /// Print document metadata only, no download.
    #[arg(long)]
    inspect_only: bool,

    /// Print results as JSON on stdout.
    #[arg(long, env = "FLIPBOOK2PDF_JSON")]
    json: bool,

    /// Treat missing pages as a failure.
    #[arg(long, env = "FLIPBOOK2PDF_STRICT")]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, env = "FLIPBOOK2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FLIPBOOK2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FLIPBOOK2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides all the feedback that matters; keep library
    // logs at error level while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let cli_progress = (show_progress && !cli.inspect_only).then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn DownloadProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for url in &cli.urls {
            let descriptor = inspect(url, &config)
                .await
                .with_context(|| format!("Failed to inspect {url}"))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&descriptor)
                        .context("Failed to serialize metadata")?
                );
            } else {
                println!("URL:          {}", url);
                println!("Title:        {}", descriptor.title);
                println!("Pages:        {}", descriptor.page_count);
                println!("First page:   {}", descriptor.sample_page_location);
            }
        }
        return Ok(());
    }

    // ── Run downloads ────────────────────────────────────────────────────
    let mut failures = 0usize;
    for url in &cli.urls {
        let result = download(url, &config).await.and_then(|output| {
            if cli.strict {
                output.into_result()
            } else {
                Ok(output)
            }
        });

        match result {
            Ok(output) => {
                let stats = &output.stats;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&output)
                            .context("Failed to serialise output")?
                    );
                }
                if !cli.quiet {
                    eprintln!(
                        "{}  {}/{} pages  {}ms  →  {}",
                        if stats.missing_pages.is_empty() {
                            green("✔")
                        } else {
                            cyan("⚠")
                        },
                        stats.assembled_pages,
                        stats.expected_pages,
                        stats.total_duration_ms,
                        bold(&output.output_path.display().to_string()),
                    );
                    if !stats.missing_pages.is_empty() {
                        eprintln!(
                            "   {} {:?}",
                            dim("missing pages:"),
                            stats.missing_pages
                        );
                    }
                }
            }
            Err(e) => {
                if let Some(ref cb) = cli_progress {
                    cb.clear();
                }
                failures += 1;
                eprintln!("{} {}: {}", red("✘"), url, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{}/{} documents failed", failures, cli.urls.len());
    }
    Ok(())
}

/// Map CLI args to `DownloadConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DownloadConfig> {
    let mut builder = DownloadConfig::builder()
        .raster_only(cli.raster_only)
        .raster_extension(cli.raster_extension.as_str())
        .cleanup(cli.cleanup)
        .skip_existing(cli.skip_existing)
        .scratch_dir(&cli.scratch_dir)
        .output_dir(&cli.output_dir)
        .request_timeout_secs(cli.timeout)
        .fetch_concurrency(cli.concurrency)
        .poll_interval_ms(cli.poll_interval_ms)
        .max_polls(cli.max_polls)
        .overscan_pt(cli.overscan)
        .headless(!cli.headful);

    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
