//! Structured analysis report attached to a chat turn
//!
//! The workflow's terminal record carries this report JSON-encoded. It
//! drives the trend and NDVI/FRP quadrant charts; clicking a scatter point
//! flies the map to it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::map::FlyToRequest;

/// NDVI (scaled by 10000) separating sparse from dense vegetation
pub const NDVI_SPLIT: f64 = 6000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartReport {
    pub analysis_valid: bool,
    pub text_report: TextReport,
    pub viz_data: VizData,
    pub debug_info: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextReport {
    pub count: u64,
    pub max_frp: f64,
    pub total_fuel_kg_s: f64,
    pub angstrom_index: f64,
    pub risk_level: String,
    pub wind_speed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VizData {
    pub trend_chart: Vec<TrendPoint>,
    pub scatter_chart: Vec<ScatterPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendPoint {
    pub scan_time: String,
    pub count: u64,
    pub energy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterPoint {
    pub frp: f64,
    pub ndvi: f64,
    pub confidence: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ScatterPoint {
    /// Camera request for this point, if it carries coordinates
    pub fn fly_to(&self) -> Option<FlyToRequest> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                Some(FlyToRequest::new(latitude, longitude, self.frp))
            }
            _ => None,
        }
    }
}

impl ChartReport {
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| Error::MalformedResponse(format!("invalid chart report: {}", e)))
    }

    pub fn axis_scale(&self) -> AxisScale {
        AxisScale::for_points(&self.viz_data.scatter_chart)
    }

    pub fn quadrants(&self) -> QuadrantStats {
        QuadrantStats::compute(&self.viz_data.scatter_chart, &self.axis_scale())
    }
}

/// FRP axis layout for the quadrant chart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScale {
    pub suggested_max: f64,
    pub step: f64,
    /// FRP separating low from high intensity
    pub quadrant_threshold: f64,
    pub max_frp: f64,
}

impl AxisScale {
    pub fn for_points(points: &[ScatterPoint]) -> Self {
        let mut frp: Vec<f64> = points.iter().map(|p| p.frp).filter(|v| v.is_finite()).collect();
        frp.sort_by(f64::total_cmp);

        let at = |q: f64| -> f64 {
            let idx = (frp.len() as f64 * q).floor() as usize;
            frp.get(idx).copied().unwrap_or(0.0)
        };
        let p50 = at(0.5);
        let p75 = at(0.75);
        let max_frp = frp.last().copied().unwrap_or(0.0);

        let mut suggested_max = (max_frp * 1.1).ceil().max(15.0);
        let step = if suggested_max <= 10.0 {
            2.0
        } else if suggested_max <= 25.0 {
            5.0
        } else if suggested_max <= 50.0 {
            10.0
        } else {
            (suggested_max / 25.0).ceil() * 5.0
        };
        suggested_max = (suggested_max / step).ceil() * step;

        Self {
            suggested_max,
            step,
            quadrant_threshold: ((p50 + p75) / 2.0).round().max(5.0),
            max_frp,
        }
    }
}

/// Point counts per NDVI/FRP quadrant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuadrantStats {
    /// Dense vegetation, high intensity
    pub top_right: usize,
    /// Sparse vegetation, high intensity
    pub top_left: usize,
    /// Dense vegetation, low intensity
    pub bottom_right: usize,
    /// Sparse vegetation, low intensity
    pub bottom_left: usize,
    /// Points above the axis maximum
    pub out_of_range: usize,
}

impl QuadrantStats {
    pub fn compute(points: &[ScatterPoint], scale: &AxisScale) -> Self {
        let threshold = scale.quadrant_threshold;
        let mut stats = Self::default();
        for point in points {
            let dense = point.ndvi > NDVI_SPLIT;
            let intense = point.frp > threshold;
            match (dense, intense) {
                (true, true) => stats.top_right += 1,
                (false, true) => stats.top_left += 1,
                (true, false) => stats.bottom_right += 1,
                (false, false) => stats.bottom_left += 1,
            }
            if point.frp > scale.suggested_max {
                stats.out_of_range += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(frp: f64, ndvi: f64) -> ScatterPoint {
        ScatterPoint {
            frp,
            ndvi,
            confidence: "nominal".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_payload() {
        let report = ChartReport::from_payload(&json!({
            "analysis_valid": true,
            "text_report": { "count": 3, "max_frp": 42.5, "risk_level": "high" },
            "viz_data": {
                "trend_chart": [{ "scan_time": "2024-03-01 09:30", "count": 3, "energy": 60.1 }],
                "scatter_chart": [{ "frp": 42.5, "ndvi": 7000, "confidence": "high", "latitude": -33.9, "longitude": 151.2 }]
            }
        }))
        .unwrap();

        assert!(report.analysis_valid);
        assert_eq!(report.text_report.count, 3);
        assert_eq!(report.viz_data.trend_chart.len(), 1);
        assert_eq!(
            report.viz_data.scatter_chart[0].fly_to(),
            Some(FlyToRequest::new(-33.9, 151.2, 42.5))
        );
    }

    #[test]
    fn test_from_payload_rejects_wrong_types() {
        assert!(ChartReport::from_payload(&json!({ "analysis_valid": "yes" })).is_err());
    }

    #[test]
    fn test_fly_to_needs_both_coordinates() {
        let mut p = point(10.0, 0.0);
        p.latitude = Some(1.0);
        assert!(p.fly_to().is_none());
    }

    #[test]
    fn test_axis_scale_small_values() {
        let scale = AxisScale::for_points(&[point(1.0, 0.0), point(2.0, 0.0), point(3.0, 0.0)]);
        assert_eq!(scale.suggested_max, 15.0);
        assert_eq!(scale.step, 5.0);
        assert_eq!(scale.quadrant_threshold, 5.0);
        assert_eq!(scale.max_frp, 3.0);
    }

    #[test]
    fn test_axis_scale_large_values() {
        let points: Vec<ScatterPoint> = [10.0, 20.0, 30.0, 40.0, 120.0]
            .iter()
            .map(|f| point(*f, 0.0))
            .collect();
        let scale = AxisScale::for_points(&points);

        // 132 -> step 30 -> rounded up to 150
        assert_eq!(scale.step, 30.0);
        assert_eq!(scale.suggested_max, 150.0);
        // p50 = 30, p75 = 40
        assert_eq!(scale.quadrant_threshold, 35.0);
    }

    #[test]
    fn test_axis_scale_empty() {
        let scale = AxisScale::for_points(&[]);
        assert_eq!(scale.max_frp, 0.0);
        assert_eq!(scale.suggested_max, 15.0);
    }

    #[test]
    fn test_quadrant_stats() {
        let points = vec![
            point(50.0, 7000.0),
            point(50.0, 6000.0),
            point(1.0, 8000.0),
            point(1.0, 100.0),
            point(2.0, 100.0),
        ];
        let scale = AxisScale::for_points(&points);
        let stats = QuadrantStats::compute(&points, &scale);

        assert_eq!(stats.top_right, 1);
        assert_eq!(stats.top_left, 1);
        assert_eq!(stats.bottom_right, 1);
        assert_eq!(stats.bottom_left, 2);
        assert_eq!(stats.out_of_range, 0);
    }
}
