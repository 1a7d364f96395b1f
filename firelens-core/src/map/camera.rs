//! Chart-driven camera transitions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::handle::{CameraTarget, MapHandle, Padding};

const FLY_DURATION: Duration = Duration::from_millis(2000);
const FLY_PITCH: f64 = 45.0;

/// Request to center the map on a point, zooming by its intensity (FRP).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlyToRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub intensity: f64,
}

impl FlyToRequest {
    pub fn new(latitude: f64, longitude: f64, intensity: f64) -> Self {
        Self {
            latitude,
            longitude,
            intensity,
        }
    }

    /// Zoom level by intensity: >30 → 12, >15 → 10, otherwise 9
    pub fn zoom(&self) -> f64 {
        if self.intensity > 30.0 {
            12.0
        } else if self.intensity > 15.0 {
            10.0
        } else {
            9.0
        }
    }

    /// Camera target, offset left by padding the right-hand share of the
    /// container (where the chat panel sits).
    pub fn target(&self, container_width: f64, lateral_offset_ratio: f64) -> CameraTarget {
        CameraTarget {
            center: Some([self.longitude, self.latitude]),
            zoom: self.zoom(),
            duration: FLY_DURATION,
            pitch: Some(FLY_PITCH),
            bearing: Some(0.0),
            padding: Some(Padding {
                right: container_width * lateral_offset_ratio,
                ..Padding::default()
            }),
        }
    }

    pub fn apply<M: MapHandle>(&self, map: &M, lateral_offset_ratio: f64) {
        tracing::debug!(
            latitude = self.latitude,
            longitude = self.longitude,
            zoom = self.zoom(),
            "Flying to point"
        );
        map.fly_to(self.target(map.container_width(), lateral_offset_ratio));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_thresholds() {
        assert_eq!(FlyToRequest::new(0.0, 0.0, 31.0).zoom(), 12.0);
        assert_eq!(FlyToRequest::new(0.0, 0.0, 30.0).zoom(), 10.0);
        assert_eq!(FlyToRequest::new(0.0, 0.0, 15.5).zoom(), 10.0);
        assert_eq!(FlyToRequest::new(0.0, 0.0, 15.0).zoom(), 9.0);
        assert_eq!(FlyToRequest::new(0.0, 0.0, 0.0).zoom(), 9.0);
    }

    #[test]
    fn test_target_padding() {
        let target = FlyToRequest::new(-33.9, 151.2, 40.0).target(1000.0, 0.3);
        assert_eq!(target.center, Some([151.2, -33.9]));
        assert_eq!(target.pitch, Some(45.0));
        assert_eq!(target.bearing, Some(0.0));
        let padding = target.padding.unwrap();
        assert!((padding.right - 300.0).abs() < 1e-9);
        assert_eq!(padding.left, 0.0);
    }
}
