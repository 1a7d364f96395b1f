//! Pulse animation of the hotspot layer

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use super::handle::MapHandle;

/// Rate limiter for animation frames.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True if a frame may be drawn at `now`; records it as drawn.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// `(circle-radius, circle-opacity)` at `t` seconds
pub fn pulse_paint(t: f64) -> (f64, f64) {
    let wave = (t * 2.5).sin();
    (8.0 + 4.0 * wave, 0.4 + 0.3 * wave)
}

/// Drives the pulse paint properties of the point layer.
#[derive(Debug, Clone)]
pub struct PulseAnimator {
    layer_id: String,
    started: Instant,
    throttle: FrameThrottle,
}

impl PulseAnimator {
    pub fn new(layer_id: &str, frame_interval: Duration, started: Instant) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            started,
            throttle: FrameThrottle::new(frame_interval),
        }
    }

    /// Draw one frame if the throttle allows and the layer exists.
    pub fn tick<M: MapHandle>(&mut self, map: &M, now: Instant) -> bool {
        if !self.throttle.ready(now) {
            return false;
        }
        if !map.has_layer(&self.layer_id) {
            return false;
        }

        let t = now.saturating_duration_since(self.started).as_secs_f64();
        let (radius, opacity) = pulse_paint(t);
        map.set_paint_property(&self.layer_id, "circle-radius", json!(radius));
        map.set_paint_property(&self.layer_id, "circle-opacity", json!(opacity));
        true
    }

    /// Animate until the task is aborted. `display_frame` is the cadence the
    /// host offers frames at; the throttle decides which ones are drawn.
    pub async fn run<M: MapHandle>(mut self, map: M, display_frame: Duration) {
        let mut ticker = tokio::time::interval(display_frame);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            let now = ticker.tick().await;
            self.tick(&map, now);
        }
    }
}
