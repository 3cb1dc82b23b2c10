//! Configuration types for flipbook downloads.
//!
//! All pipeline behaviour is controlled through [`DownloadConfig`], built via
//! its [`DownloadConfigBuilder`]. The same value is threaded through every
//! stage (polling, expansion, fetching, assembly, cleanup), so two runs with
//! equal configs behave identically and no stage reads ambient state.

use crate::error::FlipbookError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Configuration for downloading a flipbook document.
///
/// Built via [`DownloadConfig::builder()`] or using
/// [`DownloadConfig::default()`].
///
/// # Example
/// ```rust
/// use flipbook2pdf::DownloadConfig;
///
/// let config = DownloadConfig::builder()
///     .raster_only(true)
///     .cleanup(true)
///     .request_timeout_secs(20)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DownloadConfig {
    /// Fetch raster pages even when the viewer serves vector (SVGZ) pages. Default: false.
    ///
    /// The sample page location's extension is rewritten to
    /// [`raster_extension`](Self::raster_extension) before the page list is
    /// derived.
    pub raster_only: bool,

    /// Extension used by raster-only mode. Default: "jpg".
    pub raster_extension: String,

    /// Remove the scratch directory after the PDF is written. Default: false.
    pub cleanup: bool,

    /// Reuse pages already present in the scratch directory. Default: false.
    pub skip_existing: bool,

    /// Root of the scratch directories. Default: "downloads".
    ///
    /// Each document gets its own subdirectory, named after its title.
    pub scratch_dir: PathBuf,

    /// Directory the finished `<title>.pdf` is written to. Default: ".".
    pub output_dir: PathBuf,

    /// Per-page HTTP timeout in seconds. Default: 10.
    pub request_timeout_secs: u64,

    /// Number of page requests in flight at once. Default: 1.
    ///
    /// Page order in the output never depends on this value.
    pub fetch_concurrency: usize,

    /// Delay before each metadata poll, in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,

    /// Maximum number of metadata polls before giving up. Default: 60.
    pub max_polls: u32,

    /// Consecutive malformed polls tolerated before failing fast. Default: 3.
    pub malformed_grace_polls: u32,

    /// Pixel-to-point factor for sizing PDF pages. Default: 0.75 (96 dpi).
    pub px_to_pt: f32,

    /// Extra margin (points) drawn past every canvas edge. Default: 0.0.
    ///
    /// A positive value hides thin letterbox borders baked into some page
    /// images; the overflow is cropped by the page box.
    pub overscan_pt: f32,

    /// Path to a Chrome/Chromium executable. If None, the browser is auto-detected.
    pub chrome_executable: Option<PathBuf>,

    /// Run the browser without a window. Default: true.
    pub headless: bool,

    /// Timeout for the initial navigation in seconds. Default: 30.
    pub navigation_timeout_secs: u64,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            raster_only: false,
            raster_extension: "jpg".to_string(),
            cleanup: false,
            skip_existing: false,
            scratch_dir: PathBuf::from("downloads"),
            output_dir: PathBuf::from("."),
            request_timeout_secs: 10,
            fetch_concurrency: 1,
            poll_interval_ms: 1000,
            max_polls: 60,
            malformed_grace_polls: 3,
            px_to_pt: 0.75,
            overscan_pt: 0.0,
            chrome_executable: None,
            headless: true,
            navigation_timeout_secs: 30,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DownloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadConfig")
            .field("raster_only", &self.raster_only)
            .field("raster_extension", &self.raster_extension)
            .field("cleanup", &self.cleanup)
            .field("skip_existing", &self.skip_existing)
            .field("scratch_dir", &self.scratch_dir)
            .field("output_dir", &self.output_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_polls", &self.max_polls)
            .field("malformed_grace_polls", &self.malformed_grace_polls)
            .field("px_to_pt", &self.px_to_pt)
            .field("overscan_pt", &self.overscan_pt)
            .field("chrome_executable", &self.chrome_executable)
            .field("headless", &self.headless)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn DownloadProgressCallback>"),
            )
            .finish()
    }
}

impl DownloadConfig {
    /// Create a new builder for `DownloadConfig`.
    pub fn builder() -> DownloadConfigBuilder {
        DownloadConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`DownloadConfig`].
#[derive(Debug)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn raster_only(mut self, v: bool) -> Self {
        self.config.raster_only = v;
        self
    }

    /// Extension for raster-only mode; a leading dot is ignored.
    pub fn raster_extension(mut self, ext: impl Into<String>) -> Self {
        let ext: String = ext.into();
        self.config.raster_extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn cleanup(mut self, v: bool) -> Self {
        self.config.cleanup = v;
        self
    }

    pub fn skip_existing(mut self, v: bool) -> Self {
        self.config.skip_existing = v;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_polls(mut self, n: u32) -> Self {
        self.config.max_polls = n.max(1);
        self
    }

    pub fn malformed_grace_polls(mut self, n: u32) -> Self {
        self.config.malformed_grace_polls = n.max(1);
        self
    }

    pub fn px_to_pt(mut self, factor: f32) -> Self {
        self.config.px_to_pt = factor;
        self
    }

    pub fn overscan_pt(mut self, pt: f32) -> Self {
        self.config.overscan_pt = pt.max(0.0);
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DownloadConfig, FlipbookError> {
        let c = &self.config;
        if c.raster_extension.is_empty()
            || !c.raster_extension.chars().all(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(FlipbookError::InvalidConfig(format!(
                "Raster extension must be alphanumeric, got '{}'",
                c.raster_extension
            )));
        }
        if matches!(c.raster_extension.to_ascii_lowercase().as_str(), "svg" | "svgz") {
            return Err(FlipbookError::InvalidConfig(
                "Raster-only extension cannot be a vector format".into(),
            ));
        }
        if !(c.px_to_pt.is_finite() && c.px_to_pt > 0.0) {
            return Err(FlipbookError::InvalidConfig(format!(
                "Pixel-to-point factor must be > 0, got {}",
                c.px_to_pt
            )));
        }
        if !c.overscan_pt.is_finite() {
            return Err(FlipbookError::InvalidConfig("Overscan must be finite".into()));
        }
        if c.fetch_concurrency == 0 {
            return Err(FlipbookError::InvalidConfig(
                "Fetch concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
