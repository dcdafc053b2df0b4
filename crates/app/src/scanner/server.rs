//! Actix Web surface: viewer page, MJPEG stream, detection queries, manual
//! scans, health and metrics.
//!
//! The server runs on its own thread with its own actix system so the capture
//! loop never shares a runtime with request handling. Anything that blocks
//! (JPEG encoding, the synchronous manual lookup) goes through `web::block`.

use std::time::Duration;

use actix_web::{
    App, HttpResponse, HttpServer, ResponseError,
    http::{StatusCode, header},
    web::{self, Bytes},
};
use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info, trace, warn};

use crate::{
    html::viewer::VIEWER_HTML,
    scanner::{
        data::CodeResponse,
        encoding::{STREAM_BOUNDARY, ViewerCache, encode_jpeg, multipart_chunk},
        service::ScanService,
        telemetry,
    },
};

const STREAM_TICK: Duration = Duration::from_millis(33);

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) service: ScanService,
    pub(crate) jpeg_quality: u8,
}

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("Missing barcode data")]
    MissingBarcode,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingBarcode => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: &self.to_string(),
        })
    }
}

/// Handle for the HTTP server thread.
pub(crate) struct ScanServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ScanServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video_feed", web::get().to(video_feed))
        .route("/latest_barcode", web::get().to(latest_barcode))
        .route("/latest_product", web::get().to(latest_product))
        .route("/scan", web::post().to(manual_scan))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_route));
}

/// Bind `host:port` on a dedicated thread. Returns once the socket is bound,
/// or with the bind error.
pub(crate) fn spawn_scan_server(
    service: ScanService,
    host: String,
    port: u16,
    jpeg_quality: u8,
) -> Result<ScanServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::io::Result<()>>(1);

    let handle = telemetry::spawn_thread("scanner-http", move || {
        let result = actix_web::rt::System::new().block_on(async move {
            let state = web::Data::new(ServerState {
                service,
                jpeg_quality,
            });
            let bound = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
                .bind((host.as_str(), port));
            let server = match bound {
                Ok(server) => {
                    let _ = ready_tx.send(Ok(()));
                    server.run()
                }
                Err(err) => {
                    let reported = std::io::Error::new(err.kind(), err.to_string());
                    let _ = ready_tx.send(Err(reported));
                    return Err(err);
                }
            };

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        });
        if let Err(err) = result {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn HTTP server thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(ScanServer {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(anyhow::Error::new(err).context(format!("Failed to bind HTTP server on port {port}")))
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("HTTP server thread exited before binding"))
        }
    }
}

async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(VIEWER_HTML)
}

/// Decrements the viewer gauge when a stream is dropped by its client.
struct ViewerGuard;

impl ViewerGuard {
    fn enter() -> Self {
        metrics::gauge!("scanner_stream_viewers").increment(1.0);
        Self
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        metrics::gauge!("scanner_stream_viewers").decrement(1.0);
    }
}

/// Per-viewer MJPEG stream. Each viewer encodes for itself; a frame that has
/// not changed since the last tick is re-sent from the viewer's cache.
async fn video_feed(state: web::Data<ServerState>) -> HttpResponse {
    let state = state.into_inner();
    let stream = stream! {
        let _viewer = ViewerGuard::enter();
        let mut cache = ViewerCache::default();
        let mut interval = actix_web::rt::time::interval(STREAM_TICK);
        loop {
            interval.tick().await;
            let Some(frame) = state.service.latest_frame() else {
                continue;
            };
            let frame_number = frame.frame_number;
            if let Some(chunk) = cache.get(frame_number) {
                yield Ok::<Bytes, actix_web::Error>(chunk);
                continue;
            }

            trace!(frame = frame_number, captured_ms = frame.timestamp_ms, "encoding stream frame");
            let quality = state.jpeg_quality;
            match web::block(move || encode_jpeg(&frame.image, quality)).await {
                Ok(Ok(jpeg)) => {
                    let chunk = multipart_chunk(&jpeg);
                    cache.store(frame_number, chunk.clone());
                    yield Ok::<Bytes, actix_web::Error>(chunk);
                }
                Ok(Err(err)) => warn!(frame = frame_number, "stream encode failed: {err}"),
                Err(err) => warn!("stream encode task failed: {err}"),
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .insert_header((header::ACCESS_CONTROL_EXPOSE_HEADERS, "Content-Type"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .content_type(format!(
            "multipart/x-mixed-replace; boundary={STREAM_BOUNDARY}"
        ))
        .streaming(stream)
}

async fn latest_barcode(state: web::Data<ServerState>) -> Result<HttpResponse, ApiError> {
    let code = state
        .service
        .latest_code()
        .ok_or(ApiError::NotFound("No barcode detected yet"))?;
    Ok(HttpResponse::Ok().json(CodeResponse::from(&code)))
}

async fn latest_product(state: web::Data<ServerState>) -> Result<HttpResponse, ApiError> {
    let product = state
        .service
        .latest_product()
        .ok_or(ApiError::NotFound("No product data available"))?;
    Ok(HttpResponse::Ok().json(product))
}

/// `POST /scan` with `{"barcode": "<code>"}`; answers with the resolved product.
async fn manual_scan(
    state: web::Data<ServerState>,
    body: Bytes,
) -> Result<HttpResponse, ApiError> {
    let code = barcode_from_body(&body).ok_or(ApiError::MissingBarcode)?;

    let service = state.service.clone();
    let product = web::block(move || service.inject_manual_code(&code))
        .await
        .map_err(|err| {
            error!("manual scan task failed: {err}");
            ApiError::Internal
        })?
        .ok_or(ApiError::NotFound("Product not found"))?;
    Ok(HttpResponse::Ok().json(product))
}

fn barcode_from_body(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("barcode")
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

async fn health(state: web::Data<ServerState>) -> HttpResponse {
    let report = state.service.health();
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    HttpResponse::build(status).json(report)
}

async fn metrics_route() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

/// Log the address viewers should open.
pub(crate) fn announce(host: &str, port: u16) {
    let shown = if host == "0.0.0.0" { "localhost" } else { host };
    info!("viewer available at http://{shown}:{port}/");
}

#[cfg(test)]
mod tests {
    use std::{future::poll_fn, pin::pin, sync::Arc};

    use actix_web::{body::MessageBody, test};
    use image::RgbImage;
    use serde_json::json;
    use video_ingest::{
        CameraSettings, CameraSource, CaptureError, Frame, SharedCameraState, VideoDevice,
    };

    use super::*;
    use crate::scanner::{
        data::{DetectionState, FrameBuffer, ProductRecord, PublishedFrame},
        resolver::{ProductResolver, tests::RecordingLookup},
    };

    /// Opens fine, never delivers a frame.
    struct BrokenReads;

    impl VideoDevice for BrokenReads {
        fn open(&mut self, _index: i32, _size: (i32, i32)) -> Result<(), CaptureError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Frame, CaptureError> {
            Err(CaptureError::ReadFailure("no signal".into()))
        }

        fn release(&mut self) {}
    }

    struct Fixture {
        state: web::Data<ServerState>,
        detection: Arc<DetectionState>,
        frames: Arc<FrameBuffer>,
        camera: CameraSource,
    }

    fn fixture() -> Fixture {
        let detection = Arc::new(DetectionState::new());
        let frames = Arc::new(FrameBuffer::new());
        let camera_state = SharedCameraState::new();
        let camera = CameraSource::new(
            Box::new(BrokenReads),
            CameraSettings::default(),
            camera_state.clone(),
        );
        let resolver =
            ProductResolver::new(Arc::new(RecordingLookup::default()), detection.clone());
        let service = ScanService::new(detection.clone(), frames.clone(), camera_state, resolver);
        Fixture {
            state: web::Data::new(ServerState {
                service,
                jpeg_quality: 80,
            }),
            detection,
            frames,
            camera,
        }
    }

    macro_rules! app {
        ($fixture:expr) => {
            test::init_service(App::new().app_data($fixture.state.clone()).configure(routes)).await
        };
    }

    #[actix_web::test]
    async fn latest_barcode_is_404_before_any_detection() {
        let fx = fixture();
        let app = app!(fx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/latest_barcode").to_request()).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "No barcode detected yet"}));
    }

    #[actix_web::test]
    async fn latest_barcode_reports_data_and_type() {
        let fx = fixture();
        fx.detection.observe_camera_code("https://example.com", "QRCODE");
        let app = app!(fx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/latest_barcode").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"data": "https://example.com", "type": "QRCODE"}));
    }

    #[actix_web::test]
    async fn latest_product_is_404_until_resolved() {
        let fx = fixture();
        let app = app!(fx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/latest_product").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "No product data available"}));

        fx.detection
            .store_product(Some(ProductRecord(json!({"name": "Widget", "price": 3}))));
        let resp = test::call_service(&app, test::TestRequest::get().uri("/latest_product").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"name": "Widget", "price": 3}));
    }

    #[actix_web::test]
    async fn scan_without_barcode_is_400() {
        let fx = fixture();
        let app = app!(fx);

        let empty_object = test::TestRequest::post().uri("/scan").set_json(json!({})).to_request();
        let blank = test::TestRequest::post()
            .uri("/scan")
            .set_json(json!({"barcode": ""}))
            .to_request();
        let wrong_type = test::TestRequest::post()
            .uri("/scan")
            .set_json(json!({"barcode": 123}))
            .to_request();
        let garbage = test::TestRequest::post()
            .uri("/scan")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let no_body = test::TestRequest::post().uri("/scan").to_request();

        for req in [empty_object, blank, wrong_type, garbage, no_body] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({"error": "Missing barcode data"}));
        }
        assert!(fx.detection.current_code().is_none());
    }

    #[actix_web::test]
    async fn scan_resolves_synchronously_and_updates_state() {
        let fx = fixture();
        let app = app!(fx);

        let req = test::TestRequest::post()
            .uri("/scan")
            .set_json(json!({"barcode": "123"}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"name": "Widget"}));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/latest_product").to_request()).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"name": "Widget"}));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/latest_barcode").to_request()).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"data": "123", "type": "MANUAL"}));
    }

    #[actix_web::test]
    async fn scan_of_unknown_product_is_404() {
        let fx = fixture();
        let app = app!(fx);

        let req = test::TestRequest::post()
            .uri("/scan")
            .set_json(json!({"barcode": "missing"}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "Product not found"}));
    }

    #[actix_web::test]
    async fn health_follows_camera_state() {
        let mut fx = fixture();
        let app = app!(fx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        fx.camera.open().unwrap();
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"status": "OK", "camera": "Connected"}));

        assert!(fx.camera.read_frame().is_err());
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"status": "Degraded", "camera": "Disconnected"}));
    }

    #[actix_web::test]
    async fn index_references_the_stream() {
        let fx = fixture();
        let app = app!(fx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains("/video_feed"));
        assert!(html.contains("/latest_barcode"));
    }

    #[actix_web::test]
    async fn video_feed_streams_multipart_jpeg() {
        let fx = fixture();
        fx.frames.publish(PublishedFrame {
            image: RgbImage::new(64, 48),
            frame_number: 1,
            timestamp_ms: 0,
        });
        let app = app!(fx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/video_feed").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");

        let mut body = pin!(resp.into_body());
        let chunk = poll_fn(|cx| body.as_mut().poll_next(cx))
            .await
            .unwrap()
            .unwrap();
        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(chunk.starts_with(header));
        assert_eq!(&chunk[header.len()..header.len() + 2], &[0xFF, 0xD8]);
        assert!(chunk.ends_with(b"\r\n"));
    }

    #[actix_web::test]
    async fn unknown_method_on_scan_is_rejected() {
        let fx = fixture();
        let app = app!(fx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/scan").to_request()).await;

        assert!(resp.status().is_client_error());
    }
}
