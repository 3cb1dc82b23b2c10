//! # flipbook2pdf
//!
//! Download paginated "flipbook" documents from online viewers and assemble
//! their page images into a single PDF.
//!
//! ## Why a browser?
//!
//! Flipbook viewers publish the document title, page count and first page
//! image only after their JavaScript has run. The crate therefore opens the
//! document page in a headless Chromium, waits for that metadata to appear,
//! and from then on works with plain HTTP: every page asset follows the
//! naming scheme of the first one (`…/p1.svgz` → `…/p2.svgz` → …).
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Locate    headless browser + bounded polling for the metadata
//!  ├─ 2. Expand    derive page 1..N locations from the first one
//!  ├─ 3. Fetch     download pages into a scratch directory (failures skipped)
//!  ├─ 4. Assemble  decode (SVG → raster when needed) and write the PDF
//!  └─ 5. Cleanup   optionally remove the scratch directory
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flipbook2pdf::{download, DownloadConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DownloadConfig::builder().cleanup(true).build()?;
//!     let output = download("https://viewer.example.com/read/000123", &config).await?;
//!     println!("{} → {}", output.descriptor.title, output.output_path.display());
//!     if !output.is_complete() {
//!         eprintln!("missing pages: {:?}", output.stats.missing_pages);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `flipbook2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod browser;
pub mod config;
pub mod download;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use browser::{ChromeSession, MarkupSource};
pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use download::{download, download_all, download_sync, download_with, inspect};
pub use error::{FlipbookError, LocateError, PageError};
pub use output::{
    AssetFormat, DocumentDescriptor, DownloadOutput, DownloadStats, LocalAsset, PageOutcome,
    DEFAULT_TITLE,
};
pub use progress::{DownloadProgressCallback, NoopProgressCallback, ProgressCallback};
