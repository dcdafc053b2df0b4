use serde::Serialize;
use video_ingest::CameraState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub(crate) enum HealthStatus {
    #[serde(rename = "OK")]
    Ok,
    Degraded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub(crate) enum CameraLink {
    Connected,
    Disconnected,
}

/// Body of `GET /health`, derived from the camera state alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct HealthReport {
    pub(crate) status: HealthStatus,
    pub(crate) camera: CameraLink,
}

impl HealthReport {
    pub(crate) fn from_camera(state: CameraState) -> Self {
        match state {
            CameraState::Open => Self {
                status: HealthStatus::Ok,
                camera: CameraLink::Connected,
            },
            CameraState::Uninitialized | CameraState::Failed => Self {
                status: HealthStatus::Degraded,
                camera: CameraLink::Disconnected,
            },
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn open_camera_is_healthy() {
        let report = HealthReport::from_camera(CameraState::Open);
        assert!(report.is_healthy());
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({"status": "OK", "camera": "Connected"})
        );
    }

    #[test]
    fn anything_else_is_degraded() {
        for state in [CameraState::Uninitialized, CameraState::Failed] {
            let report = HealthReport::from_camera(state);
            assert!(!report.is_healthy());
            assert_eq!(
                serde_json::to_value(report).unwrap(),
                json!({"status": "Degraded", "camera": "Disconnected"})
            );
        }
    }
}
