//! Integration tests for the webshot crate

use base64::Engine;
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use webshot::{
    sanitize, HostPolicy, LocalRenderBackend, PreviewConfig, PreviewError, PreviewService,
    RemoteRenderBackend, RenderBackend,
};

fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut seed: u32 = 0x0BAD_F00D;
    let img = RgbaImage::from_fn(width, height, |_, _| {
        seed = seed.wrapping_mul(22_695_477).wrapping_add(1);
        let [a, b, c, _] = seed.to_le_bytes();
        Rgba([a, b, c, 255])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

fn config_in(dir: &Path) -> PreviewConfig {
    let mut config = PreviewConfig::default();
    config.set_cache_dir(dir);
    config.set_width(200);
    config.set_height(150);
    config.set_host_list(HostPolicy::AvoidJavaScript, dir.join("avoidjs.lst"));
    config.set_host_list(HostPolicy::NeedJavaScript, dir.join("needjs.lst"));
    config
}

/// Excluded extensions are rejected before any backend is touched
#[tokio::test]
async fn test_excluded_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn RenderBackend> = Arc::new(LocalRenderBackend::new());
    let service = PreviewService::new(config_in(dir.path()), backend).unwrap();

    let err = service
        .create_image("https://example.com/report.pdf")
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("excluded filename extension '.pdf'"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Direct image links are downloaded and stored unchanged
#[tokio::test]
async fn test_direct_image_is_downloaded() {
    let mut server = mockito::Server::new_async().await;
    let body = b"not really a png, stored as-is".to_vec();
    let mock = server
        .mock("GET", "/photo.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(body.clone())
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn RenderBackend> = Arc::new(LocalRenderBackend::new());
    let service = PreviewService::new(config_in(dir.path()), backend).unwrap();

    let url = format!("{}/photo.png", server.url());
    let name = service.create_image(&url).await.unwrap();

    assert_eq!(name, format!("{}.png", sanitize(&url)));
    assert_eq!(std::fs::read(dir.path().join(&name)).unwrap(), body);
    mock.assert_async().await;
}

/// A usable cached copy of a direct image is returned without a download
#[tokio::test]
async fn test_direct_image_served_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/photo.jpg")
        .with_status(200)
        .with_body("fresh bytes")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/photo.jpg", server.url());
    let cached = dir.path().join(format!("{}.jpg", sanitize(&url)));
    std::fs::write(&cached, vec![0x42u8; 10_000]).unwrap();

    let mut config = config_in(dir.path());
    config.set_max_age(Duration::from_secs(3600));
    let backend: Arc<dyn RenderBackend> = Arc::new(LocalRenderBackend::new());
    let service = PreviewService::new(config, backend).unwrap();

    let name = service.create_image(&url).await.unwrap();
    assert_eq!(name, format!("{}.jpg", sanitize(&url)));
    assert_eq!(std::fs::read(&cached).unwrap(), vec![0x42u8; 10_000]);
    mock.assert_async().await;
}

/// A failed download leaves nothing behind
#[tokio::test]
async fn test_direct_image_http_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing.jpg")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn RenderBackend> = Arc::new(LocalRenderBackend::new());
    let service = PreviewService::new(config_in(dir.path()), backend).unwrap();

    let url = format!("{}/missing.jpg", server.url());
    let result = service.create_image(&url).await;
    assert!(matches!(result, Err(PreviewError::Network(_))));
    assert!(!dir.path().join(format!("{}.jpg", sanitize(&url))).exists());
}

/// Pages go through the remote backend, get normalized and cached
#[tokio::test]
async fn test_page_rendered_by_remote_service() {
    let mut server = mockito::Server::new_async().await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(noisy_png(800, 600));
    let mock = server
        .mock("POST", "/render")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "url": "https://example.com/news",
            "width": 200,
            "height": 150,
            "format": "png",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::json!({ "success": true, "image": encoded }).to_string())
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.set_max_age(Duration::from_secs(24 * 3600));
    let backend: Arc<dyn RenderBackend> =
        Arc::new(RemoteRenderBackend::new(format!("{}/render", server.url()), None).unwrap());
    let service = PreviewService::new(config, backend).unwrap();

    let first = service.create_image("https://example.com/news").await.unwrap();
    let second = service.create_image("https://example.com/news").await.unwrap();

    assert_eq!(first, "httpsexamplecomnews.png");
    assert_eq!(first, second);
    let stored = image::load_from_memory(&std::fs::read(dir.path().join(&first)).unwrap()).unwrap();
    assert_eq!((stored.width(), stored.height()), (200, 150));
    mock.assert_async().await;
}

/// Remote service failures surface as errors and write no file
#[tokio::test]
async fn test_remote_service_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/render")
        .with_status(200)
        .with_body(r#"{"success": false, "error": "navigation failed"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn RenderBackend> =
        Arc::new(RemoteRenderBackend::new(format!("{}/render", server.url()), None).unwrap());
    let service = PreviewService::new(config_in(dir.path()), backend).unwrap();

    let result = service.create_image("https://example.com/broken").await;
    assert!(matches!(result, Err(PreviewError::BackendFault { .. })));
    assert!(!dir.path().join("httpsexamplecombroken.png").exists());
}

/// Health check of the remote service
#[tokio::test]
async fn test_remote_backend_health() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/health")
        .with_status(200)
        .create_async()
        .await;

    let backend = RemoteRenderBackend::new(server.url(), None).unwrap();
    assert!(backend.is_available().await);

    let backend = RemoteRenderBackend::new("http://127.0.0.1:1", None).unwrap();
    assert!(!backend.is_available().await);
}

/// The remote backend reports its name through the service
#[tokio::test]
async fn test_service_backend_name() {
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn RenderBackend> =
        Arc::new(RemoteRenderBackend::new("https://screenshot.example.com", None).unwrap());
    let service = PreviewService::new(config_in(dir.path()), backend).unwrap();
    assert_eq!(service.backend_name(), "remote-api");
}
