//! Vector page decoding: SVG / SVGZ → `RgbaImage` via resvg.
//!
//! Some viewers serve pages as gzip-compressed SVG. The assembler works on
//! pixels only, so vector pages are rendered at their intrinsic size onto a
//! white background before they join the raster path. `usvg` detects the
//! gzip header itself, so `.svg` and `.svgz` share one code path.

use image::RgbaImage;
use resvg::{tiny_skia, usvg};
use std::path::Path;
use tracing::debug;

/// Renders SVG documents to raster images.
///
/// Holds the parsing options (including the system font database) so that
/// fonts are loaded once per document rather than once per page.
pub struct SvgRasterizer {
    options: usvg::Options<'static>,
}

impl SvgRasterizer {
    pub fn new() -> Self {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        Self { options }
    }

    /// Rasterise the SVG or SVGZ file at `path`.
    pub fn rasterize_file(&self, path: &Path) -> Result<RgbaImage, String> {
        let data = std::fs::read(path).map_err(|e| e.to_string())?;
        self.rasterize_bytes(&data)
    }

    /// Rasterise in-memory SVG or SVGZ data.
    pub fn rasterize_bytes(&self, data: &[u8]) -> Result<RgbaImage, String> {
        let tree = usvg::Tree::from_data(data, &self.options).map_err(|e| e.to_string())?;
        let size = tree.size().to_int_size();
        let (w, h) = (size.width(), size.height());

        let mut pixmap = tiny_skia::Pixmap::new(w, h)
            .ok_or_else(|| format!("cannot allocate {w}x{h} pixmap"))?;
        // Opaque background: premultiplied and straight alpha coincide, so
        // the pixmap bytes can be handed to `image` unchanged.
        pixmap.fill(tiny_skia::Color::WHITE);
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        debug!("Rasterised SVG → {}x{} px", w, h);
        RgbaImage::from_raw(w, h, pixmap.take())
            .ok_or_else(|| "pixmap size mismatch".to_string())
    }
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}
