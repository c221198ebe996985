//! The draggable, zoomable viewport over the full time range.
//!
//! `ViewportModel` is the pure state machine: handle drags, track clicks and
//! zoom steps, all in percent of the full range. `ViewportScrubber` wires that
//! model to the engine: it queues range updates for the next frame, pushes the
//! resulting window to the charts and keeps the cursor inside it.

use crate::common::{ConsumerId, Millis, SourceKind};
use crate::components::broadcaster::CursorBroadcaster;
use crate::context::{lock, FlagGuard, FrameRequest, SyncContext};
use crate::error::{Result, SyncError};
use crate::events::{RangeOrigin, SyncEvent};
use crate::time::format_millis;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const FULL: f64 = 100.0;

/// `v` limited to `[lo, hi]`. Unlike `f64::clamp` this never panics; `hi`
/// wins when the bounds cross.
fn bound(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// The visible window in percent of the full range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub left: f64,
    pub width: f64,
}

impl ViewportState {
    pub fn full() -> Self {
        Self {
            left: 0.0,
            width: FULL,
        }
    }

    pub fn left_fraction(&self) -> f64 {
        self.left / FULL
    }

    pub fn width_fraction(&self) -> f64 {
        self.width / FULL
    }

    pub fn right_fraction(&self) -> f64 {
        (self.left + self.width) / FULL
    }
}

/// Where the pointer went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubTarget {
    LeftHandle,
    RightHandle,
    /// The viewport body between the handles.
    Body,
}

/// Pointer position and viewport at the start of a drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragAnchor {
    pub start_pointer: f64,
    pub start_left: f64,
    pub start_width: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ScrubState {
    #[default]
    Idle,
    DraggingLeft(DragAnchor),
    DraggingRight(DragAnchor),
    DraggingCenter(DragAnchor),
}

impl ScrubState {
    pub fn is_dragging(&self) -> bool {
        !matches!(self, ScrubState::Idle)
    }
}

#[derive(Debug, Clone)]
pub struct ViewportModel {
    state: ViewportState,
    scrub: ScrubState,
    /// Narrowest width, in percent.
    min_width: f64,
    track_width_px: f64,
}

impl ViewportModel {
    /// `min_width` is a fraction of the full range, e.g. `0.05`.
    pub fn new(min_width: f64) -> Self {
        Self {
            state: ViewportState::full(),
            scrub: ScrubState::Idle,
            min_width: bound(min_width * FULL, f64::MIN_POSITIVE, FULL),
            track_width_px: 0.0,
        }
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn scrub_state(&self) -> ScrubState {
        self.scrub
    }

    pub fn min_width(&self) -> f64 {
        self.min_width
    }

    /// Replaces the window, normalizing it into the valid region.
    pub fn set_state(&mut self, left: f64, width: f64) -> ViewportState {
        let width = bound(width, self.min_width, FULL);
        self.state = ViewportState {
            left: bound(left, 0.0, FULL - width),
            width,
        };
        self.state
    }

    pub fn resize(&mut self, track_width_px: f64) {
        self.track_width_px = track_width_px;
    }

    pub fn track_width_px(&self) -> f64 {
        self.track_width_px
    }

    /// Converts a track x coordinate into percent, if the track has a size.
    pub fn percent_at(&self, x_px: f64) -> Option<f64> {
        (self.track_width_px > 0.0 && x_px.is_finite()).then(|| x_px / self.track_width_px * FULL)
    }

    /// `Idle -> Dragging*`. Any other starting state aborts and stays put.
    pub fn begin_drag(&mut self, target: ScrubTarget, pointer: f64) -> Result<ScrubState> {
        if self.scrub.is_dragging() {
            return Err(SyncError::DragAborted("a drag is already in progress"));
        }
        if !pointer.is_finite() {
            return Err(SyncError::DragAborted("pointer position is not a number"));
        }
        let anchor = DragAnchor {
            start_pointer: pointer,
            start_left: self.state.left,
            start_width: self.state.width,
        };
        self.scrub = match target {
            ScrubTarget::LeftHandle => ScrubState::DraggingLeft(anchor),
            ScrubTarget::RightHandle => ScrubState::DraggingRight(anchor),
            ScrubTarget::Body => ScrubState::DraggingCenter(anchor),
        };
        Ok(self.scrub)
    }

    /// Moves the dragged edge or body to follow `pointer`. Idle ignores moves.
    pub fn drag_to(&mut self, pointer: f64) -> Option<ViewportState> {
        let (anchor, center) = match self.scrub {
            ScrubState::Idle => return None,
            ScrubState::DraggingLeft(a) | ScrubState::DraggingRight(a) => (a, false),
            ScrubState::DraggingCenter(a) => (a, true),
        };
        if !pointer.is_finite() {
            return None;
        }
        let delta = pointer - anchor.start_pointer;
        let (sl, sw) = (anchor.start_left, anchor.start_width);

        let (mut left, mut width) = match self.scrub {
            ScrubState::DraggingLeft(_) => {
                // Right edge stays where it was.
                let left = bound(sl + delta, 0.0, sl + sw - self.min_width);
                (left, sw - (left - sl))
            }
            ScrubState::DraggingRight(_) => (sl, bound(sw + delta, self.min_width, FULL - sl)),
            _ => (bound(sl + delta, 0.0, FULL - sw), sw),
        };
        if left + width > FULL {
            if center {
                left = FULL - width;
            } else {
                width = FULL - left;
            }
        }
        self.state = ViewportState {
            left: bound(left, 0.0, FULL),
            width: bound(width, 0.0, FULL),
        };
        Some(self.state)
    }

    /// `Dragging* -> Idle`, unconditionally. Returns the state that ended.
    pub fn end_drag(&mut self) -> ScrubState {
        std::mem::take(&mut self.scrub)
    }

    /// Centers the window on `pointer` without entering a drag.
    pub fn recenter_at(&mut self, pointer: f64) -> ViewportState {
        let width = self.state.width;
        self.set_state(pointer - width / 2.0, width)
    }

    /// Scales the width by `factor` around the current center.
    pub fn zoom(&mut self, factor: f64) -> ViewportState {
        let center = self.state.left + self.state.width / 2.0;
        let width = bound(self.state.width * factor, self.min_width, FULL);
        self.set_state(center - width / 2.0, width)
    }

    pub fn reset(&mut self) -> ViewportState {
        self.state = ViewportState::full();
        self.state
    }
}

/// Applies viewport changes to the rest of the engine.
#[derive(Clone)]
pub struct ViewportScrubber {
    ctx: Arc<SyncContext>,
    broadcaster: CursorBroadcaster,
}

impl ViewportScrubber {
    pub fn new(ctx: Arc<SyncContext>, broadcaster: CursorBroadcaster) -> Self {
        Self { ctx, broadcaster }
    }

    pub fn state(&self) -> ViewportState {
        lock(&self.ctx.viewport).state()
    }

    pub fn scrub_state(&self) -> ScrubState {
        lock(&self.ctx.viewport).scrub_state()
    }

    /// Records the track's on-screen width, e.g. after a window resize.
    pub fn resize(&self, track_width_px: f64) {
        lock(&self.ctx.viewport).resize(track_width_px);
    }

    /// Starts a drag. `target` is `None` when the pointer hit no known handle
    /// element; the scrubber then stays idle.
    pub fn pointer_down(&self, target: Option<ScrubTarget>, x_px: f64) -> Result<ScrubState> {
        let mut model = lock(&self.ctx.viewport);
        let Some(target) = target else {
            warn!("Drag start ignored: no handle under the pointer.");
            return Err(SyncError::DragAborted("handle element missing"));
        };
        let Some(pointer) = model.percent_at(x_px) else {
            warn!("Drag start ignored: track has no width.");
            return Err(SyncError::DragAborted("track has no width"));
        };
        let state = model.begin_drag(target, pointer)?;
        trace!("Drag started: {:?}", state);
        Ok(state)
    }

    pub fn pointer_move(&self, x_px: f64) -> Option<ViewportState> {
        let moved = {
            let mut model = lock(&self.ctx.viewport);
            let pointer = model.percent_at(x_px)?;
            model.drag_to(pointer)?
        };
        self.ctx
            .request_frame(FrameRequest::Viewport(RangeOrigin::Scrubber));
        Some(moved)
    }

    pub fn pointer_up(&self) -> ScrubState {
        lock(&self.ctx.viewport).end_drag()
    }

    pub fn click_track(&self, x_px: f64) -> Option<ViewportState> {
        let state = {
            let mut model = lock(&self.ctx.viewport);
            let pointer = model.percent_at(x_px)?;
            model.recenter_at(pointer)
        };
        self.ctx
            .request_frame(FrameRequest::Viewport(RangeOrigin::Scrubber));
        Some(state)
    }

    pub fn zoom(&self, factor: f64) -> ViewportState {
        let state = lock(&self.ctx.viewport).zoom(factor);
        self.ctx.request_frame(FrameRequest::Viewport(RangeOrigin::Zoom));
        state
    }

    pub fn zoom_in(&self) -> ViewportState {
        self.zoom(self.ctx.config().viewport.zoom_in_factor)
    }

    pub fn zoom_out(&self) -> ViewportState {
        self.zoom(self.ctx.config().viewport.zoom_out_factor)
    }

    /// Wheel over the track: scrolling up zooms in, down zooms out.
    pub fn wheel(&self, delta_y: f64) -> Option<ViewportState> {
        if delta_y < 0.0 {
            Some(self.zoom_in())
        } else if delta_y > 0.0 {
            Some(self.zoom_out())
        } else {
            None
        }
    }

    pub fn reset(&self) -> ViewportState {
        let state = lock(&self.ctx.viewport).reset();
        self.ctx.request_frame(FrameRequest::Viewport(RangeOrigin::Reset));
        state
    }

    /// Follows a pan or zoom the user made directly on a chart.
    ///
    /// The window is derived from the reported bounds, not from pointer
    /// deltas. The reporting chart (`reporter`) is not sent the range back.
    /// Reports that arrive while the scrubber is itself pushing a range to the
    /// charts are echoes and are ignored.
    pub fn on_chart_range_changed(
        &self,
        reporter: Option<ConsumerId>,
        start: Millis,
        end: Millis,
    ) -> Option<ViewportState> {
        if self.ctx.applying_range.load(Ordering::Acquire) {
            trace!("Ignoring chart range {}..{} echoed during apply.", start, end);
            return None;
        }
        let _from_chart = FlagGuard::acquire(&self.ctx.updating_from_chart)?;
        let axis = self.ctx.axis();
        let (lo, hi) = (start.min(end), start.max(end));
        let left = axis.fraction_of(lo)?;
        let right = axis.fraction_of(hi)?;
        let state = lock(&self.ctx.viewport).set_state(left * FULL, (right - left) * FULL);
        self.apply_range(RangeOrigin::Chart, reporter);
        Some(state)
    }

    /// Applies the model's window to the engine: visible range, chart ranges,
    /// cursor clamping and labels. Returns the applied `(start, end)`.
    pub fn apply_range(
        &self,
        origin: RangeOrigin,
        reporter: Option<ConsumerId>,
    ) -> Option<(Millis, Millis)> {
        let axis = self.ctx.axis();
        let state = self.state();
        let (Some(start), Some(end)) = (
            axis.time_at_fraction(state.left_fraction()),
            axis.time_at_fraction(state.right_fraction()),
        ) else {
            debug!("Viewport change ignored: no data loaded.");
            self.ctx.set_visible_range(None);
            return None;
        };
        self.ctx.set_visible_range(Some((start, end)));

        let from_chart = self.ctx.updating_from_chart.load(Ordering::Acquire);
        if !from_chart || reporter.is_some() {
            match FlagGuard::acquire(&self.ctx.applying_range) {
                Some(_applying) => {
                    let skip = if from_chart { reporter } else { None };
                    self.broadcaster.set_chart_ranges(start, end, skip);
                }
                None => debug!("Nested range apply skipped for {}..{}.", start, end),
            }
        }

        let cursor = self.ctx.cursor();
        if let Some(time) = cursor.time {
            if time < start || time > end {
                debug!("Cursor {} left the window; moving it to {}.", time, start);
                self.broadcaster.dispatch(start, SourceKind::Timeline);
            }
        }

        let (start_label, end_label) = (format_millis(start), format_millis(end));
        debug!("Viewport {} .. {} ({:?}).", start_label, end_label, origin);
        self.ctx.emit(SyncEvent::ViewportChanged {
            start,
            end,
            start_label,
            end_label,
            origin,
        });
        Some((start, end))
    }
}
