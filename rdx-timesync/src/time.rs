//! Timestamp normalization and the frame clock.
//!
//! Telemetry arrives with timestamps as integers, floats or strings. Everything
//! is normalized to epoch milliseconds before it reaches the time axis.

use crate::common::Millis;
use crate::config::FrameResolution;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A timestamp as found in a raw telemetry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    /// Normalizes to epoch milliseconds. `None` means the value is unusable.
    pub fn to_millis(&self) -> Option<Millis> {
        match self {
            RawTimestamp::Millis(ms) => Some(*ms),
            RawTimestamp::Float(ms) => float_millis(*ms),
            RawTimestamp::Text(text) => parse_timestamp(text),
        }
    }
}

impl From<i64> for RawTimestamp {
    fn from(ms: i64) -> Self {
        RawTimestamp::Millis(ms)
    }
}

impl From<&str> for RawTimestamp {
    fn from(text: &str) -> Self {
        RawTimestamp::Text(text.to_string())
    }
}

/// Parses a textual timestamp.
///
/// Accepts numeric milliseconds, RFC 3339, and naive date-times which are
/// taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<Millis> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(ms) = text.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(ms) = text.parse::<f64>() {
        return float_millis(ms);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    NAIVE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .map(|naive| naive.and_utc().timestamp_millis())
    })
}

fn float_millis(ms: f64) -> Option<Millis> {
    if ms.is_finite() && ms.abs() < i64::MAX as f64 {
        Some(ms.round() as Millis)
    } else {
        None
    }
}

/// Formats a timestamp for the time-range labels as `HH:MM:SS.mmm` (UTC).
pub fn format_millis(ms: Millis) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(at) => at.format("%H:%M:%S%.3f").to_string(),
        None => format!("{ms}ms"),
    }
}

/// One beat of the frame clock.
#[derive(Debug, Clone)]
pub struct FrameTick {
    pub frame: u64,
    pub timestamp: Instant,
}

/// Emits a `FrameTick` at the configured frame rate until shut down.
///
/// Late frames are skipped rather than replayed, the same way a display skips
/// refreshes it could not make.
pub struct FrameClock {
    resolution: FrameResolution,
    sender: broadcast::Sender<Arc<FrameTick>>,
}

impl FrameClock {
    pub fn new(resolution: FrameResolution, sender: broadcast::Sender<Arc<FrameTick>>) -> Self {
        Self { resolution, sender }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = time::interval(self.resolution.frame_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame: u64 = 0;
        debug!(
            "FrameClock running at {} fps.",
            self.resolution.frames_per_second()
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                at = interval.tick() => {
                    frame += 1;
                    trace!("Frame #{} scheduled.", frame);
                    // No receivers is fine; the frame is simply unobserved.
                    self.sender.send(Arc::new(FrameTick { frame, timestamp: at })).ok();
                }
            }
        }
        debug!("FrameClock stopped after {} frames.", frame);
    }
}
