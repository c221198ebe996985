//! The engine facade that wires every timesync component together.

use crate::axis::{interpolate, TimeAxis};
use crate::common::{ConsumerId, ConsumerRole, Millis, SourceKind};
use crate::components::broadcaster::{CursorBroadcaster, DispatchOutcome};
use crate::components::consumer::CursorConsumer;
use crate::components::limiter::{Debounce, Throttle};
use crate::components::scrubber::ViewportScrubber;
use crate::config::SyncConfig;
use crate::context::{lock, CursorSnapshot, FlagGuard, FrameRequest, SyncContext};
use crate::data::Dataset;
use crate::events::{RangeOrigin, SyncEvent};
use crate::time::{FrameClock, FrameTick};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// The applied visible range, if a viewport update ran.
    pub viewport: Option<(Millis, Millis)>,
    /// The outcome of the cursor update, if one ran.
    pub cursor: Option<DispatchOutcome>,
}

impl FrameReport {
    pub fn is_idle(&self) -> bool {
        self.viewport.is_none() && self.cursor.is_none()
    }
}

/// The main timesync engine.
///
/// Cloning is cheap and yields another handle to the same session, so input
/// handlers, the frame loop and consumers that report chart gestures can all
/// hold one.
///
/// Pointer input flows through a throttle into a per-frame queue; `run_frame`
/// (driven by `run`, or called directly) applies the queued viewport change
/// first and then the newest cursor position.
#[derive(Clone)]
pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    broadcaster: CursorBroadcaster,
    scrubber: ViewportScrubber,
    pointer_throttle: Arc<Mutex<Throttle<(Millis, SourceKind)>>>,
    leave_debounce: Arc<Mutex<Debounce<()>>>,
}

// Core implementation block for internal logic.
impl SyncEngine {
    /// Creates a new `SyncEngine` with the given configuration.
    pub fn new(config: SyncConfig) -> Self {
        let throttle_interval = config.rate_limits.pointer_throttle();
        let debounce_wait = config.rate_limits.leave_debounce();
        let ctx = SyncContext::new(config);
        let broadcaster = CursorBroadcaster::new(ctx.clone());
        let scrubber = ViewportScrubber::new(ctx.clone(), broadcaster.clone());

        let throttle_ctx = ctx.clone();
        let pointer_throttle = Throttle::new(throttle_interval, move |(time, source)| {
            if let Some(cancelled) =
                throttle_ctx.request_frame(FrameRequest::Cursor { time, source })
            {
                trace!("Superseded pending {:?}.", cancelled);
            }
        });
        let debounce_ctx = ctx.clone();
        let leave_debounce = Debounce::new(debounce_wait, move |()| {
            debounce_ctx.request_frame(FrameRequest::ClearCursor);
        });

        Self {
            ctx,
            broadcaster,
            scrubber,
            pointer_throttle: Arc::new(Mutex::new(pointer_throttle)),
            leave_debounce: Arc::new(Mutex::new(leave_debounce)),
        }
    }

    /// Runs the frame loop until a shutdown signal is received.
    ///
    /// This method will:
    /// 1. Spawn the `FrameClock` task.
    /// 2. Spawn the frame task that flushes queued updates on every tick.
    /// 3. Wait for a Ctrl+C signal to initiate a graceful shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("SyncEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);
        let (frame_tx, _) = broadcast::channel(16);

        let resolution = self.ctx.config().frame_resolution.clone();
        let clock = FrameClock::new(resolution, frame_tx.clone());
        let frame_rx = frame_tx.subscribe();
        let clock_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { clock.run(clock_shutdown_rx).await });

        let frames = self.clone();
        let frames_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { frames.frame_loop(frame_rx, frames_shutdown_rx).await });

        info!(
            "Engine running at {} fps. Press Ctrl+C to shut down.",
            self.ctx.config().frame_resolution.frames_per_second()
        );
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received. Stopping frame loop...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.ctx.emit(SyncEvent::EngineShutdown);
        info!("SyncEngine has shut down.");
        Ok(())
    }

    #[doc(hidden)]
    async fn frame_loop(
        self,
        mut frame_rx: broadcast::Receiver<Arc<FrameTick>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        self.ctx.emit(SyncEvent::EngineStarted {
            timestamp: tokio::time::Instant::now(),
        });
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                tick = frame_rx.recv() => match tick {
                    Ok(tick) => {
                        let report = self.run_frame();
                        if !report.is_idle() {
                            trace!("Frame #{}: {:?}", tick.frame, report);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Frame loop lagged by {} frames.", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }
}

// Public API implementation block.
impl SyncEngine {
    /// Flushes the queued frame work: viewport first, then cursor.
    pub fn run_frame(&self) -> FrameReport {
        let mut report = FrameReport::default();
        for request in self.ctx.take_frame_requests() {
            match request {
                FrameRequest::Viewport(origin) => {
                    report.viewport = self.scrubber.apply_range(origin, None);
                }
                FrameRequest::Cursor { time, source } => {
                    report.cursor = Some(self.broadcaster.dispatch(time, source));
                }
                FrameRequest::ClearCursor => {
                    report.cursor = Some(self.broadcaster.clear());
                }
            }
        }
        report
    }

    /// Replaces the dataset: new axis, full viewport, no cursor.
    ///
    /// Work queued for the old dataset is discarded.
    pub fn load_dataset(&self, dataset: &Dataset) -> Option<(Millis, Millis)> {
        self.load_axis(dataset.time_axis())
    }

    /// As `load_dataset`, for callers that build their own axis.
    pub fn load_axis(&self, axis: TimeAxis) -> Option<(Millis, Millis)> {
        let bounds = axis.bounds();
        let timestamps = axis.len();
        self.ctx.discard_frame_requests();
        self.ctx.replace_axis(axis);
        lock(&self.ctx.viewport).reset();
        lock(&self.pointer_throttle).reset();
        lock(&self.leave_debounce).cancel();

        if self.broadcaster.clear() == DispatchOutcome::Dropped {
            warn!("Cursor not cleared on reload: a dispatch is in flight.");
        }
        info!("Dataset loaded: {} timestamps, bounds {:?}.", timestamps, bounds);
        self.ctx.emit(SyncEvent::DatasetLoaded {
            timestamps,
            start: bounds.map(|(start, _)| start),
            end: bounds.map(|(_, end)| end),
        });
        self.scrubber.apply_range(RangeOrigin::Reload, None)
    }

    /// Registers a view consumer. Chart consumers immediately receive the
    /// current visible range, if there is one.
    pub fn register(&self, role: ConsumerRole, consumer: Box<dyn CursorConsumer>) -> ConsumerId {
        let name = consumer.name().to_string();
        let id = lock(&self.ctx.consumers).insert(role, consumer);
        info!("Consumer '{}' registered as {:?}.", name, role);
        self.ctx.emit(SyncEvent::ConsumerAdded { id, role });
        if role.is_chart() {
            if let Some((start, end)) = self.ctx.visible_range() {
                // The new chart may echo the range back; treat it as applied.
                let _applying = FlagGuard::acquire(&self.ctx.applying_range);
                self.broadcaster
                    .set_chart_ranges_where(start, end, |other| other == id);
            }
        }
        id
    }

    /// Registers a consumer whose view may not exist (e.g. a map that failed
    /// to mount). A missing one is logged and skipped.
    pub fn register_optional(
        &self,
        role: ConsumerRole,
        consumer: Option<Box<dyn CursorConsumer>>,
    ) -> Option<ConsumerId> {
        match consumer {
            Some(consumer) => Some(self.register(role, consumer)),
            None => {
                warn!("No {:?} consumer available; continuing without it.", role);
                None
            }
        }
    }

    /// Removes a consumer. Returns `true` if it was registered.
    pub fn unregister(&self, id: ConsumerId) -> bool {
        let removed = lock(&self.ctx.consumers).remove(id);
        if removed {
            self.ctx.emit(SyncEvent::ConsumerRemoved { id });
        }
        removed
    }

    /// Pointer over a chart, already converted to time by the chart's scale.
    ///
    /// Returns `false` if the throttle dropped the event.
    pub fn hover_time(&self, time: Millis, source: SourceKind) -> bool {
        lock(&self.leave_debounce).cancel();
        lock(&self.pointer_throttle).call((time, source))
    }

    /// Pointer over a plain track, mapped linearly onto the visible range.
    pub fn hover_track(&self, x_px: f64, width_px: f64, source: SourceKind) -> bool {
        match self.time_at_track(x_px, width_px) {
            Some(time) => self.hover_time(time, source),
            None => false,
        }
    }

    /// Pointer left a view. Bursts of leave events collapse into one clear.
    /// Must be called from within a tokio runtime.
    pub fn pointer_leave(&self) {
        lock(&self.leave_debounce).call(());
    }

    /// Moves the cursor right away, bypassing throttle and frame batching.
    pub fn dispatch_now(&self, time: Millis, source: SourceKind) -> DispatchOutcome {
        self.broadcaster.dispatch(time, source)
    }

    /// Hides the cursor right away.
    pub fn clear_now(&self) -> DispatchOutcome {
        self.broadcaster.clear()
    }

    /// Linear interpolation of a track position over the visible range.
    pub fn time_at_track(&self, x_px: f64, width_px: f64) -> Option<Millis> {
        if !(width_px > 0.0) || !x_px.is_finite() {
            return None;
        }
        let (start, end) = self.ctx.visible_range()?;
        let fraction = (x_px / width_px).clamp(0.0, 1.0);
        Some(interpolate(start, end, fraction))
    }

    pub fn cursor(&self) -> CursorSnapshot {
        self.ctx.cursor()
    }

    pub fn visible_range(&self) -> Option<(Millis, Millis)> {
        self.ctx.visible_range()
    }

    pub fn axis(&self) -> TimeAxis {
        self.ctx.axis()
    }

    pub fn config(&self) -> &SyncConfig {
        self.ctx.config()
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    pub fn broadcaster(&self) -> &CursorBroadcaster {
        &self.broadcaster
    }

    pub fn scrubber(&self) -> &ViewportScrubber {
        &self.scrubber
    }

    /// Subscribes to the `SyncEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.ctx.subscribe()
    }
}
