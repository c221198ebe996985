//! # Timesync
//!
//! A shared time cursor and visible-range engine for telemetry views.
//!
//! Timesync keeps every view of a recorded session (charts, readouts, a map,
//! a timeline) pointed at the same instant and the same time window. The
//! surrounding application feeds it pointer input and owns the actual views;
//! the engine decides what time the cursor is at, which samples that maps to,
//! and when each view is told.
//!
//! ## Core Concepts
//!
//! - **TimeAxis**: The sorted, deduplicated union of every timestamp in the
//!   loaded dataset.
//! - **Cursor**: The single "current time", moved by pointer input and fanned
//!   out to consumers in a fixed order by the `CursorBroadcaster`.
//! - **Viewport**: The visible window over the axis, driven by a draggable
//!   scrubber, zoom steps and charts reporting their own pans.
//! - **Frame batching**: Pointer input is throttled and queued; the engine
//!   applies at most one viewport change and one cursor change per frame.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use timesync::prelude::*;
//!
//! struct Printer;
//!
//! impl CursorConsumer for Printer {
//!     fn name(&self) -> &str {
//!         "printer"
//!     }
//!     fn update(&mut self, time: Millis, nearest: usize) -> anyhow::Result<()> {
//!         println!("cursor at {} (sample {})", format_millis(time), nearest);
//!         Ok(())
//!     }
//!     fn clear(&mut self) -> anyhow::Result<()> {
//!         println!("cursor hidden");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create the engine from a default configuration.
//!     let engine = SyncEngine::new(SyncConfig::default());
//!
//!     // 2. Register the views that follow the cursor.
//!     engine.register(ConsumerRole::FloatingLabel, Box::new(Printer));
//!
//!     // 3. Load data and feed pointer input.
//!     let ignition = Channel::digital("ignition", [(RawTimestamp::from(1_000), true)]);
//!     engine.load_dataset(&Dataset { channels: vec![ignition], ..Default::default() });
//!     engine.hover_time(1_200, SourceKind::Chart);
//!
//!     // 4. Run the frame loop. It will shut down on Ctrl+C.
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Timesync Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod axis;
pub mod common;
pub mod components;
pub mod config;
pub mod context;
pub mod data;
pub mod demo;
pub mod engine;
pub mod error;
pub mod events;
pub mod time;

/// A prelude module for easy importing of the most common Timesync types.
pub mod prelude {
    pub use crate::axis::{TimeAxis, Timestamped};
    pub use crate::common::{ConsumerId, ConsumerRole, Millis, SourceKind};
    pub use crate::components::broadcaster::DispatchOutcome;
    pub use crate::components::consumer::{ChartConsumer, CursorConsumer};
    pub use crate::components::resolver::NearestTimeResolver;
    pub use crate::components::scrubber::{ScrubState, ScrubTarget, ViewportState};
    pub use crate::config::{FrameResolution, SyncConfig};
    pub use crate::data::{AnalogValue, Channel, Dataset, GpsFix, GpsTrack};
    pub use crate::engine::{FrameReport, SyncEngine};
    pub use crate::error::SyncError;
    pub use crate::events::{RangeOrigin, SyncEvent};
    pub use crate::time::{format_millis, RawTimestamp};
}
