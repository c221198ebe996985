//! Defines all public event types broadcast by the timesync engine.
//!
//! Views never need these to stay in sync; the consumer registry does that.
//! The stream exists for tooling, logging and tests that want to observe what
//! the engine decided.

use crate::common::{ConsumerId, ConsumerRole, Millis, SourceKind};
use tokio::time::Instant;

/// What caused a change of the visible time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOrigin {
    /// A handle or body drag, or a click on the track.
    Scrubber,
    /// A zoom button or wheel step.
    Zoom,
    Reset,
    /// A chart reported its own pan/zoom.
    Chart,
    /// A new dataset was loaded.
    Reload,
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Fired once when the engine's `run` loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
    ConsumerAdded { id: ConsumerId, role: ConsumerRole },
    ConsumerRemoved { id: ConsumerId },
    /// A dataset replaced the time axis.
    DatasetLoaded {
        timestamps: usize,
        start: Option<Millis>,
        end: Option<Millis>,
    },
    /// One complete dispatch reached every registered consumer.
    CursorMoved {
        time: Millis,
        index: usize,
        source: SourceKind,
    },
    CursorCleared,
    /// A dispatch arrived while another was in flight and was discarded.
    DispatchDropped { time: Option<Millis>, source: SourceKind },
    /// A consumer failed during a dispatch; the rest still ran.
    ConsumerFailed {
        id: ConsumerId,
        name: String,
        reason: String,
    },
    ViewportChanged {
        start: Millis,
        end: Millis,
        start_label: String,
        end_label: String,
        origin: RangeOrigin,
    },
}
