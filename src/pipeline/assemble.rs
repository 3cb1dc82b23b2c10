//! PDF assembly: one page per stored asset, all on the first page's canvas.
//!
//! ## Why a fixed canvas?
//!
//! Flipbook pages are exported at one nominal size, but individual assets
//! occasionally differ by a few pixels (or come from a different rendition
//! when a vector page fell back to raster). Sizing every PDF page after the
//! first decoded asset keeps the document uniform; each image is stretched
//! onto that canvas, optionally grown by `overscan_pt` so thin borders baked
//! into the images fall outside the page box.
//!
//! JPEG pages are embedded as-is (`DCTDecode`); every other page is decoded
//! to RGB and Flate-compressed as soon as it is added, so only one page's
//! pixels are held in memory at a time.
//!
//! Decoding and PDF encoding are CPU-bound and run inside `spawn_blocking`.

use crate::config::DownloadConfig;
use crate::error::{FlipbookError, PageError};
use crate::output::{AssetFormat, LocalAsset};
use crate::pipeline::rasterize::SvgRasterizer;
use crate::progress::DownloadProgressCallback;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// What was written to the output PDF.
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub pages_written: usize,
    /// Canvas size in points (width, height).
    pub page_size: (f32, f32),
    /// 1-indexed pages present in the PDF, ascending.
    pub assembled: Vec<usize>,
    /// Assets that could not be decoded.
    pub skipped: Vec<PageError>,
}

/// A decoded page, ready to become an image XObject.
enum PageImage {
    /// Original JPEG bytes, embedded without re-encoding.
    Jpeg {
        data: Vec<u8>,
        width: u32,
        height: u32,
        gray: bool,
    },
    Pixels(RgbImage),
}

impl PageImage {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            PageImage::Jpeg { width, height, .. } => (*width, *height),
            PageImage::Pixels(img) => img.dimensions(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PageGeometry {
    px_to_pt: f32,
    overscan_pt: f32,
}

/// Assemble `assets` (ascending index order) into a PDF at `output`.
pub async fn assemble(
    assets: &[LocalAsset],
    output: &Path,
    config: &DownloadConfig,
) -> Result<AssemblyReport, FlipbookError> {
    let assets = assets.to_vec();
    let output = output.to_path_buf();
    let geometry = PageGeometry {
        px_to_pt: config.px_to_pt,
        overscan_pt: config.overscan_pt,
    };
    let progress = config.progress_callback.clone();

    tokio::task::spawn_blocking(move || {
        assemble_blocking(&assets, &output, geometry, progress.as_deref())
    })
    .await
    .map_err(|e| FlipbookError::Internal(format!("Assembly task panicked: {}", e)))?
}

/// Blocking implementation of PDF assembly.
fn assemble_blocking(
    assets: &[LocalAsset],
    output: &Path,
    geometry: PageGeometry,
    progress: Option<&dyn DownloadProgressCallback>,
) -> Result<AssemblyReport, FlipbookError> {
    let total = assets.len();
    if let Some(cb) = progress {
        cb.on_assemble_start(total);
    }

    let rasterizer = assets
        .iter()
        .any(|a| a.format == AssetFormat::Vector)
        .then(SvgRasterizer::new);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(total);
    let mut canvas: Option<(f32, f32)> = None;
    let mut assembled = Vec::with_capacity(total);
    let mut skipped = Vec::new();

    for asset in assets {
        let image = match load_page(asset, rasterizer.as_ref()) {
            Ok(img) => img,
            Err(detail) => {
                warn!("Skipping page {}: {}", asset.index, detail);
                skipped.push(PageError::Decode {
                    page: asset.index,
                    detail,
                });
                continue;
            }
        };

        let (img_w, img_h) = image.dimensions();
        let page_size = *canvas.get_or_insert_with(|| {
            (
                img_w as f32 * geometry.px_to_pt,
                img_h as f32 * geometry.px_to_pt,
            )
        });

        let page_id = add_page(&mut doc, pages_id, image, page_size, geometry.overscan_pt)?;
        kids.push(page_id.into());
        assembled.push(asset.index);
        debug!("Added page {} to PDF", asset.index);

        if let Some(cb) = progress {
            cb.on_page_assembled(asset.index, total);
        }
    }

    let Some(page_size) = canvas else {
        return Err(FlipbookError::NoPagesAssembled {
            fetched: total,
            first_error: skipped
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no pages to assemble".to_string()),
        });
    };

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    write_atomic(&mut doc, output)?;
    info!(
        "Wrote {} pages ({:.0}×{:.0} pt) to {}",
        assembled.len(),
        page_size.0,
        page_size.1,
        output.display()
    );

    Ok(AssemblyReport {
        pages_written: assembled.len(),
        page_size,
        assembled,
        skipped,
    })
}

/// Load one asset: JPEG bytes pass through, everything else becomes RGB
/// pixels (vector pages are rasterised first).
fn load_page(asset: &LocalAsset, rasterizer: Option<&SvgRasterizer>) -> Result<PageImage, String> {
    match (asset.format, rasterizer) {
        (AssetFormat::Vector, Some(r)) => r
            .rasterize_file(&asset.path)
            .map(|rgba| PageImage::Pixels(DynamicImage::ImageRgba8(rgba).to_rgb8())),
        (AssetFormat::Vector, None) => Err("no SVG rasteriser available".to_string()),
        (AssetFormat::Raster, _) => {
            let data = std::fs::read(&asset.path).map_err(|e| e.to_string())?;
            // Scratch names may carry a placeholder extension; trust the bytes.
            if image::guess_format(&data).ok() == Some(ImageFormat::Jpeg) {
                return jpeg_passthrough(data);
            }
            ImageReader::new(Cursor::new(data))
                .with_guessed_format()
                .map_err(|e| e.to_string())?
                .decode()
                .map(|img| PageImage::Pixels(img.to_rgb8()))
                .map_err(|e| e.to_string())
        }
    }
}

/// Read the JPEG header for size and colour model, keeping the bytes as-is.
fn jpeg_passthrough(data: Vec<u8>) -> Result<PageImage, String> {
    let decoder = JpegDecoder::new(Cursor::new(data.as_slice())).map_err(|e| e.to_string())?;
    let (width, height) = decoder.dimensions();
    let gray = match decoder.color_type() {
        ColorType::L8 => true,
        ColorType::Rgb8 => false,
        other => return Err(format!("unsupported JPEG colour type {other:?}")),
    };
    Ok(PageImage::Jpeg {
        data,
        width,
        height,
        gray,
    })
}

fn real(v: f32) -> Object {
    Object::Real(v)
}

/// Add one page showing `image` stretched over the canvas.
fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    image: PageImage,
    (page_w, page_h): (f32, f32),
    overscan: f32,
) -> Result<ObjectId, FlipbookError> {
    let image_stream = match image {
        PageImage::Jpeg {
            data,
            width,
            height,
            gray,
        } => Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => if gray { "DeviceGray" } else { "DeviceRGB" },
                "BitsPerComponent" => 8i64,
                "Filter" => "DCTDecode",
            },
            data,
        )
        .with_compression(false),
        PageImage::Pixels(img) => {
            let (width, height) = img.dimensions();
            let mut stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8i64,
                },
                img.into_raw(),
            );
            stream.compress().map_err(|e| {
                FlipbookError::Internal(format!("Failed to compress page image: {e}"))
            })?;
            stream
        }
    };
    let image_id = doc.add_object(image_stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(page_w + 2.0 * overscan),
                    real(0.0),
                    real(0.0),
                    real(page_h + 2.0 * overscan),
                    real(-overscan),
                    real(-overscan),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| FlipbookError::Internal(format!("Failed to encode page content: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![real(0.0), real(0.0), real(page_w), real(page_h)],
    }))
}

/// Write to a temporary sibling, then persist it under the final name, so a
/// failed run never leaves a truncated PDF behind.
fn write_atomic(doc: &mut Document, output: &Path) -> Result<(), FlipbookError> {
    let write_err = |detail: String| FlipbookError::OutputWriteFailed {
        path: output.to_path_buf(),
        detail,
    };

    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| write_err(e.to_string()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".flipbook2pdf-")
        .suffix(".pdf.tmp")
        .tempfile_in(dir)
        .map_err(|e| write_err(e.to_string()))?;
    doc.save_to(tmp.as_file_mut())
        .map_err(|e| write_err(e.to_string()))?;
    tmp.persist(output)
        .map_err(|e| write_err(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use image::Rgb;
    use std::io::Write;
    use tempfile::TempDir;

    /// Image XObjects of the PDF at `path`, in object-id order.
    fn image_streams(path: &Path) -> Vec<Stream> {
        let doc = Document::load(path).expect("readable pdf");
        doc.objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
            .cloned()
            .collect()
    }

    fn filter_of(stream: &Stream) -> Option<Vec<u8>> {
        match stream.dict.get(b"Filter") {
            Ok(Object::Name(n)) => Some(n.clone()),
            _ => None,
        }
    }

    /// A noisy photo-like page, so JPEG and raw sizes differ a lot.
    fn write_jpeg(dir: &Path, index: usize, w: u32, h: u32) -> LocalAsset {
        let path = dir.join(format!("page_{index}.jpg"));
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
        })
        .save(&path)
        .unwrap();
        LocalAsset::new(index, path)
    }

    fn write_png(dir: &Path, index: usize, w: u32, h: u32) -> LocalAsset {
        let path = dir.join(format!("page_{index}.png"));
        RgbImage::from_pixel(w, h, Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        LocalAsset::new(index, path)
    }

    fn media_boxes(path: &Path) -> Vec<Vec<f32>> {
        let doc = Document::load(path).expect("readable pdf");
        doc.get_pages()
            .values()
            .map(|&id| {
                doc.get_object(id)
                    .and_then(Object::as_dict)
                    .and_then(|d| d.get(b"MediaBox"))
                    .and_then(Object::as_array)
                    .expect("page has MediaBox")
                    .iter()
                    .map(|o| o.as_float().expect("numeric"))
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn canvas_follows_first_asset() {
        let tmp = TempDir::new().unwrap();
        let assets = vec![
            write_png(tmp.path(), 1, 100, 200),
            write_png(tmp.path(), 2, 50, 50),
            write_png(tmp.path(), 3, 300, 100),
        ];
        let out = tmp.path().join("Book.pdf");

        let report = assemble(&assets, &out, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(report.pages_written, 3);
        assert_eq!(report.page_size, (75.0, 150.0));
        for mb in media_boxes(&out) {
            assert_eq!(mb, vec![0.0, 0.0, 75.0, 150.0]);
        }
    }

    #[tokio::test]
    async fn undecodable_asset_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("page_2.jpg");
        std::fs::write(&bad, b"<html>403 Forbidden</html>").unwrap();
        let assets = vec![
            write_png(tmp.path(), 1, 40, 40),
            LocalAsset::new(2, bad),
            write_png(tmp.path(), 3, 40, 40),
        ];
        let out = tmp.path().join("Book.pdf");

        let report = assemble(&assets, &out, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(report.assembled, vec![1, 3]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].page(), 2);
        assert_eq!(media_boxes(&out).len(), 2);
    }

    #[tokio::test]
    async fn nothing_decodable_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("page_1.png");
        std::fs::write(&bad, b"garbage").unwrap();
        let out = tmp.path().join("Book.pdf");

        let err = assemble(&[LocalAsset::new(1, bad)], &out, &DownloadConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FlipbookError::NoPagesAssembled { fetched: 1, .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn vector_pages_are_rasterised() {
        let tmp = TempDir::new().unwrap();
        let svg = tmp.path().join("page_1.svg");
        std::fs::write(
            &svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="80" height="40"><rect width="80" height="40" fill="blue"/></svg>"#,
        )
        .unwrap();
        let out = tmp.path().join("nested/dir/Vector.pdf");

        let report = assemble(&[LocalAsset::new(1, svg)], &out, &DownloadConfig::default())
            .await
            .unwrap();
        assert_eq!(report.page_size, (60.0, 30.0));
        assert!(out.exists());
    }

    #[tokio::test]
    async fn overscan_keeps_page_box() {
        let tmp = TempDir::new().unwrap();
        let assets = vec![write_png(tmp.path(), 1, 100, 100)];
        let out = tmp.path().join("Overscan.pdf");
        let config = DownloadConfig::builder().overscan_pt(4.0).build().unwrap();

        assemble(&assets, &out, &config).await.unwrap();
        assert_eq!(media_boxes(&out), vec![vec![0.0, 0.0, 75.0, 75.0]]);
    }

    #[tokio::test]
    async fn jpeg_pages_are_embedded_without_reencoding() {
        let tmp = TempDir::new().unwrap();
        let assets = vec![
            write_jpeg(tmp.path(), 1, 400, 600),
            write_jpeg(tmp.path(), 2, 400, 600),
        ];
        let jpeg_bytes: u64 = assets
            .iter()
            .map(|a| std::fs::metadata(&a.path).unwrap().len())
            .sum();
        let out = tmp.path().join("Photos.pdf");

        let report = assemble(&assets, &out, &DownloadConfig::default())
            .await
            .unwrap();
        assert_eq!(report.page_size, (300.0, 450.0));

        let images = image_streams(&out);
        assert_eq!(images.len(), 2);
        for (stream, asset) in images.iter().zip(&assets) {
            assert_eq!(filter_of(stream).as_deref(), Some(&b"DCTDecode"[..]));
            assert_eq!(stream.content, std::fs::read(&asset.path).unwrap());
        }
        // Raw RGB would be 2 × 720 000 bytes.
        let pdf_bytes = std::fs::metadata(&out).unwrap().len();
        assert!(pdf_bytes < jpeg_bytes + 4096, "{pdf_bytes} vs {jpeg_bytes}");
    }

    #[tokio::test]
    async fn jpeg_with_misleading_extension_still_passes_through() {
        let tmp = TempDir::new().unwrap();
        let jpeg = write_jpeg(tmp.path(), 1, 40, 20);
        let renamed = tmp.path().join("page_1.img");
        std::fs::rename(&jpeg.path, &renamed).unwrap();
        let out = tmp.path().join("Renamed.pdf");

        assemble(&[LocalAsset::new(1, renamed)], &out, &DownloadConfig::default())
            .await
            .unwrap();
        let images = image_streams(&out);
        assert_eq!(filter_of(&images[0]).as_deref(), Some(&b"DCTDecode"[..]));
    }

    #[tokio::test]
    async fn decoded_pages_are_flate_compressed() {
        let tmp = TempDir::new().unwrap();
        let assets = vec![write_png(tmp.path(), 1, 300, 300)];
        let out = tmp.path().join("Flat.pdf");

        assemble(&assets, &out, &DownloadConfig::default())
            .await
            .unwrap();

        let images = image_streams(&out);
        assert_eq!(filter_of(&images[0]).as_deref(), Some(&b"FlateDecode"[..]));
        assert!(images[0].content.len() < 300 * 300 * 3 / 10);
    }

    #[tokio::test]
    async fn gzipped_svg_pages_are_rasterised() {
        let tmp = TempDir::new().unwrap();
        let svgz = tmp.path().join("page_1.svgz");
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(
            br#"<svg xmlns="http://www.w3.org/2000/svg" width="80" height="40"><rect width="80" height="40" fill="blue"/></svg>"#,
        )
        .unwrap();
        std::fs::write(&svgz, gz.finish().unwrap()).unwrap();
        let out = tmp.path().join("Compressed.pdf");

        let report = assemble(&[LocalAsset::new(1, svgz)], &out, &DownloadConfig::default())
            .await
            .unwrap();
        assert_eq!(report.assembled, vec![1]);
        assert_eq!(report.page_size, (60.0, 30.0));
        assert_eq!(media_boxes(&out), vec![vec![0.0, 0.0, 60.0, 30.0]]);
    }
}
