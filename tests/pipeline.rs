//! Integration tests for the download pipeline.
//!
//! The browser is replaced by a scripted [`MarkupSource`] and page assets are
//! served by a tiny HTTP/1.1 server on a loopback port, so these tests need
//! neither Chromium nor network access.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use flipbook2pdf::{
    download_with, DownloadConfig, DownloadProgressCallback, FlipbookError, MarkupSource,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// One canned response: status, body and a delay before answering.
#[derive(Clone)]
struct Reply {
    status: u16,
    body: Vec<u8>,
    delay_ms: u64,
}

impl Reply {
    fn png(width: u32, height: u32) -> Self {
        Self {
            status: 200,
            body: png_bytes(width, height),
            delay_ms: 0,
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: b"not found".to_vec(),
            delay_ms: 0,
        }
    }

    fn delayed(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

/// Serves fixed replies by request path and records every path requested.
struct PageServer {
    base: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl PageServer {
    async fn start(routes: HashMap<String, Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let hits_task = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&hits_task);
                tokio::spawn(async move {
                    let Some(path) = read_request_path(&mut socket).await else {
                        return;
                    };
                    hits.lock().unwrap().push(path.clone());

                    let reply = routes.get(&path).cloned().unwrap_or_else(Reply::not_found);
                    if reply.delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(reply.delay_ms)).await;
                    }
                    let head = format!(
                        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                        reply.status,
                        reply.body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&reply.body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base, hits }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

/// Read the request head and return the request target (path + query).
async fn read_request_path(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Markup source that returns "loading" once, then the rendered viewer.
struct FakeViewer {
    frames: Vec<String>,
    next: usize,
}

impl FakeViewer {
    fn rendered(title: &str, pages: usize, first_page: &str) -> Self {
        let ready = format!(
            r#"<html><head><meta name="description" content="Title: {title}, Author: Tester, Length: {pages} pages, Published: 2024"></head>
<body><div class="viewer"><img class="page" src="{first_page}"></div></body></html>"#
        );
        Self {
            frames: vec!["<html><body>loading</body></html>".to_string(), ready],
            next: 0,
        }
    }
}

impl MarkupSource for FakeViewer {
    async fn navigate(&mut self, _url: &str) -> Result<(), FlipbookError> {
        Ok(())
    }

    async fn markup(&mut self) -> Result<String, FlipbookError> {
        let idx = self.next.min(self.frames.len() - 1);
        self.next += 1;
        Ok(self.frames[idx].clone())
    }

    async fn close(self) -> Result<(), FlipbookError> {
        Ok(())
    }
}

/// Records which pages each progress event was fired for.
#[derive(Default)]
struct RecordingProgress {
    fetched: Mutex<Vec<usize>>,
    failed: Mutex<Vec<(usize, String)>>,
    assembled: Mutex<Vec<usize>>,
}

impl DownloadProgressCallback for RecordingProgress {
    fn on_page_fetched(&self, index: usize, _total: usize, _bytes: u64, _reused: bool) {
        self.fetched.lock().unwrap().push(index);
    }

    fn on_page_failed(&self, index: usize, _total: usize, error: &str) {
        self.failed.lock().unwrap().push((index, error.to_string()));
    }

    fn on_page_assembled(&self, index: usize, _total: usize) {
        self.assembled.lock().unwrap().push(index);
    }
}

fn config_in(tmp: &TempDir) -> flipbook2pdf::DownloadConfigBuilder {
    DownloadConfig::builder()
        .scratch_dir(tmp.path().join("downloads"))
        .output_dir(tmp.path().join("out"))
        .poll_interval_ms(0)
        .max_polls(5)
        .request_timeout_secs(5)
}

fn pdf_page_count(path: &Path) -> usize {
    lopdf::Document::load(path).unwrap().get_pages().len()
}

const DOC_URL: &str = "https://viewer.example.com/read/000123";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_page_is_skipped_and_reported() {
    let server = PageServer::start(HashMap::from([
        ("/doc/p1.png".to_string(), Reply::png(40, 60)),
        ("/doc/p2.png".to_string(), Reply::not_found()),
        ("/doc/p3.png".to_string(), Reply::png(40, 60)),
    ]))
    .await;
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp).build().unwrap();
    let viewer = FakeViewer::rendered("Field Guide", 3, &server.url("/doc/p1.png"));

    let output = assert_ok!(download_with(viewer, DOC_URL, &config).await);

    assert_eq!(output.descriptor.title, "Field Guide");
    assert_eq!(output.output_path, tmp.path().join("out/Field Guide.pdf"));
    assert_eq!(pdf_page_count(&output.output_path), 2);
    assert_eq!(output.stats.expected_pages, 3);
    assert_eq!(output.stats.fetched_pages, 2);
    assert_eq!(output.stats.assembled_pages, 2);
    assert_eq!(output.stats.missing_pages, vec![2]);
    assert_eq!(output.stats.poll_attempts, 2);
    assert!(!output.is_complete());

    let failed = output.pages[1].error.as_ref().unwrap();
    assert_eq!(failed.page(), 2);
    assert!(failed.to_string().contains("404"), "{failed}");

    // Scratch files stay put without cleanup.
    let scratch = tmp.path().join("downloads/Field Guide");
    assert!(scratch.join("page_1.png").exists());
    assert!(!scratch.join("page_2.png").exists());
    assert!(scratch.join("page_3.png").exists());

    let err = assert_err!(output.into_result());
    assert!(matches!(
        err,
        FlipbookError::PartialDownload {
            assembled: 2,
            expected: 3,
            ..
        }
    ));
}

#[tokio::test]
async fn progress_fires_once_per_attempted_page() {
    let server = PageServer::start(HashMap::from([
        ("/doc/p1.png".to_string(), Reply::png(40, 60)),
        ("/doc/p2.png".to_string(), Reply::not_found()),
        ("/doc/p3.png".to_string(), Reply::png(40, 60)),
    ]))
    .await;
    let tmp = TempDir::new().unwrap();
    let progress = Arc::new(RecordingProgress::default());
    let config = config_in(&tmp)
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let viewer = FakeViewer::rendered("Observed", 3, &server.url("/doc/p1.png"));

    assert_ok!(download_with(viewer, DOC_URL, &config).await);

    let fetched = progress.fetched.lock().unwrap().clone();
    let failed = progress.failed.lock().unwrap().clone();
    assert_eq!(fetched, vec![1, 3]);
    assert_eq!(fetched.len() + failed.len(), 3);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, 2);
    assert!(failed[0].1.contains("404"), "{}", failed[0].1);
    assert_eq!(*progress.assembled.lock().unwrap(), vec![1, 3]);
}

#[tokio::test]
async fn no_fetched_pages_is_fatal() {
    let server = PageServer::start(HashMap::new()).await;
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp).build().unwrap();
    let viewer = FakeViewer::rendered("Gone", 2, &server.url("/doc/p1.png"));

    let err = assert_err!(download_with(viewer, DOC_URL, &config).await);

    assert!(matches!(err, FlipbookError::NoPagesFetched { expected: 2, .. }));
    assert!(!tmp.path().join("out/Gone.pdf").exists());
}

#[tokio::test]
async fn skip_existing_reuses_stored_pages() {
    let server = PageServer::start(HashMap::from([
        ("/doc/p1.png".to_string(), Reply::png(40, 60)),
        ("/doc/p2.png".to_string(), Reply::png(40, 60)),
    ]))
    .await;
    let tmp = TempDir::new().unwrap();
    let scratch = tmp.path().join("downloads/Resumed");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("page_1.png"), png_bytes(40, 60)).unwrap();

    let config = config_in(&tmp).skip_existing(true).build().unwrap();
    let viewer = FakeViewer::rendered("Resumed", 2, &server.url("/doc/p1.png"));

    let output = assert_ok!(download_with(viewer, DOC_URL, &config).await);

    assert_eq!(server.hits(), vec!["/doc/p2.png".to_string()]);
    assert!(output.pages[0].reused);
    assert!(!output.pages[1].reused);
    assert_eq!(output.stats.reused_pages, 1);
    assert_eq!(pdf_page_count(&output.output_path), 2);
    assert!(output.is_complete());
}

#[tokio::test]
async fn without_skip_existing_pages_are_fetched_again() {
    let server = PageServer::start(HashMap::from([(
        "/doc/p1.png".to_string(),
        Reply::png(40, 60),
    )]))
    .await;
    let tmp = TempDir::new().unwrap();
    let scratch = tmp.path().join("downloads/Fresh");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("page_1.png"), b"stale").unwrap();

    let config = config_in(&tmp).build().unwrap();
    let viewer = FakeViewer::rendered("Fresh", 1, &server.url("/doc/p1.png"));

    let output = assert_ok!(download_with(viewer, DOC_URL, &config).await);

    assert_eq!(server.hits(), vec!["/doc/p1.png".to_string()]);
    assert_eq!(
        std::fs::read(scratch.join("page_1.png")).unwrap(),
        png_bytes(40, 60)
    );
    assert_eq!(output.stats.reused_pages, 0);
}

#[tokio::test]
async fn cleanup_removes_scratch_directory() {
    let server = PageServer::start(HashMap::from([
        ("/doc/p1.png".to_string(), Reply::png(40, 60)),
        ("/doc/p2.png".to_string(), Reply::png(40, 60)),
    ]))
    .await;
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp).cleanup(true).build().unwrap();
    let viewer = FakeViewer::rendered("Tidy", 2, &server.url("/doc/p1.png"));

    let output = assert_ok!(download_with(viewer, DOC_URL, &config).await);

    assert!(output.output_path.exists());
    assert!(!tmp.path().join("downloads/Tidy").exists());
    assert!(!tmp.path().join("downloads").exists());
}

#[tokio::test]
async fn raster_only_rewrites_extension_and_keeps_query() {
    let server = PageServer::start(HashMap::from([
        ("/doc/p1.jpg?tok=abc".to_string(), Reply::png(40, 60)),
        ("/doc/p2.jpg?tok=abc".to_string(), Reply::png(40, 60)),
    ]))
    .await;
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp).raster_only(true).build().unwrap();
    let viewer = FakeViewer::rendered("Vector Book", 2, &server.url("/doc/p1.svgz?tok=abc"));

    let output = assert_ok!(download_with(viewer, DOC_URL, &config).await);

    let mut hits = server.hits();
    hits.sort();
    assert_eq!(hits, vec!["/doc/p1.jpg?tok=abc", "/doc/p2.jpg?tok=abc"]);
    assert!(output.pages[0].location.ends_with("/doc/p1.jpg?tok=abc"));
    assert!(tmp.path().join("downloads/Vector Book/page_1.jpg").exists());
    assert_eq!(pdf_page_count(&output.output_path), 2);
}

#[tokio::test]
async fn concurrent_fetch_keeps_page_order() {
    // Earlier pages answer later, so completion order is reversed.
    let server = PageServer::start(HashMap::from([
        ("/doc/p1.png".to_string(), Reply::png(40, 60).delayed(300)),
        ("/doc/p2.png".to_string(), Reply::png(40, 60).delayed(150)),
        ("/doc/p3.png".to_string(), Reply::png(40, 60)),
        ("/doc/p4.png".to_string(), Reply::not_found()),
    ]))
    .await;
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp).fetch_concurrency(4).build().unwrap();
    let viewer = FakeViewer::rendered("Parallel", 4, &server.url("/doc/p1.png"));

    let output = assert_ok!(download_with(viewer, DOC_URL, &config).await);

    let indices: Vec<usize> = output.pages.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert_eq!(output.stats.missing_pages, vec![4]);
    assert_eq!(pdf_page_count(&output.output_path), 3);
}

#[tokio::test]
async fn relative_page_location_resolves_against_document_url() {
    let server = PageServer::start(HashMap::from([(
        "/doc/p1.png".to_string(),
        Reply::png(40, 60),
    )]))
    .await;
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp).build().unwrap();
    let viewer = FakeViewer::rendered("Relative", 1, "../doc/p1.png");
    let doc_url = server.url("/read/000123");

    let output = assert_ok!(download_with(viewer, &doc_url, &config).await);

    assert_eq!(output.descriptor.sample_page_location, server.url("/doc/p1.png"));
    assert_eq!(server.hits(), vec!["/doc/p1.png".to_string()]);
}
