//! Read-side accessors used by the HTTP layer, plus manual code injection.

use std::sync::Arc;

use tracing::info;
use video_ingest::SharedCameraState;

use crate::scanner::{
    data::{DetectedCode, DetectionState, FrameBuffer, ProductRecord, PublishedFrame},
    health::HealthReport,
    resolver::ProductResolver,
};

#[derive(Clone)]
pub(crate) struct ScanService {
    detection: Arc<DetectionState>,
    frames: Arc<FrameBuffer>,
    camera: SharedCameraState,
    resolver: ProductResolver,
}

impl ScanService {
    pub(crate) fn new(
        detection: Arc<DetectionState>,
        frames: Arc<FrameBuffer>,
        camera: SharedCameraState,
        resolver: ProductResolver,
    ) -> Self {
        Self {
            detection,
            frames,
            camera,
            resolver,
        }
    }

    pub(crate) fn latest_code(&self) -> Option<DetectedCode> {
        self.detection.current_code()
    }

    pub(crate) fn latest_product(&self) -> Option<ProductRecord> {
        self.detection.current_product()
    }

    pub(crate) fn latest_frame(&self) -> Option<Arc<PublishedFrame>> {
        self.frames.snapshot()
    }

    /// Make `code` current and resolve it synchronously. Blocks on the lookup.
    pub(crate) fn inject_manual_code(&self, code: &str) -> Option<ProductRecord> {
        info!(barcode = code, "manual scan");
        metrics::counter!("scanner_manual_scans_total").increment(1);
        self.detection.set_manual_code(code);
        self.resolver.resolve(code)
    }

    pub(crate) fn health(&self) -> HealthReport {
        HealthReport::from_camera(self.camera.get())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use video_ingest::CameraState;

    use super::*;
    use crate::scanner::{data::MANUAL_SYMBOLOGY, resolver::tests::RecordingLookup};

    fn service() -> (ScanService, Arc<RecordingLookup>) {
        let detection = Arc::new(DetectionState::new());
        let lookup = Arc::new(RecordingLookup::default());
        let resolver = ProductResolver::new(lookup.clone(), detection.clone());
        let service = ScanService::new(
            detection,
            Arc::new(FrameBuffer::new()),
            SharedCameraState::new(),
            resolver,
        );
        (service, lookup)
    }

    #[test]
    fn manual_injection_answers_synchronously() {
        let (service, lookup) = service();

        let product = service.inject_manual_code("123");

        assert_eq!(product, Some(ProductRecord(json!({"name": "Widget"}))));
        assert_eq!(service.latest_product(), product);
        let code = service.latest_code().unwrap();
        assert_eq!(code.value, "123");
        assert_eq!(code.symbology, MANUAL_SYMBOLOGY);
        assert_eq!(lookup.calls(), vec!["123"]);
    }

    #[test]
    fn manual_injection_of_unknown_code_clears_product() {
        let (service, _) = service();
        service.inject_manual_code("123");

        assert_eq!(service.inject_manual_code("missing"), None);
        assert_eq!(service.latest_product(), None);
        assert_eq!(service.latest_code().unwrap().value, "missing");
    }

    #[test]
    fn empty_state_reports_nothing() {
        let (service, _) = service();
        assert!(service.latest_code().is_none());
        assert!(service.latest_product().is_none());
        assert!(service.latest_frame().is_none());
        assert_eq!(
            service.health(),
            HealthReport::from_camera(CameraState::Uninitialized)
        );
    }
}
