//! Selected hotspot state and the click protocol

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::geo::Feature;

use super::geocode::Geocoder;
use super::handle::{CameraTarget, MapHandle};

/// Format used for the displayed acquisition timestamp
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CLICK_ZOOM: f64 = 9.0;
const CLICK_PITCH: f64 = 30.0;
const CLICK_DURATION: Duration = Duration::from_millis(2000);

/// Display record for a clicked hotspot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedPoint {
    pub id: u64,
    /// `[longitude, latitude]`
    pub loc: [f64; 2],
    /// Administrative region, filled in by reverse geocoding
    pub district: String,
    pub confidence: String,
    pub frp: f64,
    pub bright_ti4: f64,
    pub bright_ti5: f64,
    /// True for daytime acquisitions
    pub daynight: bool,
    pub date_time: String,
    pub acquired_at: Option<DateTime<Utc>>,
    pub satellite: String,
    pub ndvi: f64,
}

impl SelectedPoint {
    pub fn from_feature(feature: &Feature) -> Self {
        let props = &feature.properties;
        let acquired_at = acquisition_time(&props.acq_date, props.acq_time);
        let date_time = match acquired_at {
            Some(ts) => ts.format(DATE_TIME_FORMAT).to_string(),
            None => props.acq_date.clone(),
        };

        Self {
            id: feature.id,
            loc: feature.geometry.coordinates,
            district: String::new(),
            confidence: props.confidence.clone(),
            frp: props.frp,
            bright_ti4: props.bright_ti4,
            bright_ti5: props.bright_ti5,
            daynight: props.daynight == "D",
            date_time,
            acquired_at,
            satellite: props.satellite.clone(),
            ndvi: props.ndvi / 10000.0,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.loc[0]
    }

    pub fn latitude(&self) -> f64 {
        self.loc[1]
    }
}

/// Combine an acquisition date with an `HHMM` time of day (UTC).
///
/// The date may be a plain `YYYY-MM-DD` or a full RFC 3339 timestamp such as
/// `2024-03-01T00:00:00.000Z`; only its calendar date is used. Returns `None`
/// if the date does not parse or the time is out of range.
pub fn acquisition_time(acq_date: &str, acq_time: u16) -> Option<DateTime<Utc>> {
    let date = parse_acq_date(acq_date.trim())?;
    let time = NaiveTime::from_hms_opt(u32::from(acq_time / 100), u32::from(acq_time % 100), 0)?;
    Some(date.and_time(time).and_utc())
}

fn parse_acq_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|ts| ts.date())
}

/// Currently selected hotspot, observable by side panels.
#[derive(Clone)]
pub struct Selection {
    tx: Arc<watch::Sender<Option<SelectedPoint>>>,
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

impl Selection {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SelectedPoint>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<SelectedPoint> {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, point: SelectedPoint) {
        self.tx.send_replace(Some(point));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Handle a click on a rendered hotspot: extract, publish, then fly there.
    pub fn handle_click<M: MapHandle>(&self, map: &M, feature: &Feature) -> SelectedPoint {
        let point = SelectedPoint::from_feature(feature);
        tracing::debug!(id = point.id, date_time = %point.date_time, "Hotspot selected");
        self.publish(point.clone());
        map.fly_to(CameraTarget {
            center: Some(point.loc),
            zoom: CLICK_ZOOM,
            duration: CLICK_DURATION,
            pitch: Some(CLICK_PITCH),
            bearing: None,
            padding: None,
        });
        point
    }

    /// Set the district of the selected point, but only if it is still `id`.
    pub fn apply_district(&self, id: u64, district: &str) -> bool {
        self.tx.send_if_modified(|current| match current {
            Some(point) if point.id == id && point.district != district => {
                point.district = district.to_string();
                true
            }
            _ => false,
        })
    }

    /// Reverse geocode the current selection.
    ///
    /// The result is dropped if another point was selected meanwhile.
    pub async fn resolve_district<G: Geocoder>(&self, geocoder: &G) -> Option<String> {
        let point = self.current()?;
        match geocoder.reverse_geocode(point.longitude(), point.latitude()).await {
            Ok(Some(district)) => {
                if self.apply_district(point.id, &district) {
                    Some(district)
                } else {
                    tracing::debug!(id = point.id, "Selection changed, dropping district");
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(id = point.id, error = %e, "Reverse geocoding failed");
                None
            }
        }
    }
}
