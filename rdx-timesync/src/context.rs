//! Session-wide state shared by every engine component.
//!
//! A `SyncContext` is created once at startup and handed to each component as
//! an `Arc`. Components read and write cursor, viewport and frame state only
//! through it.

use crate::axis::TimeAxis;
use crate::common::{Millis, SourceKind};
use crate::components::consumer::ConsumerRegistry;
use crate::components::resolver::NearestTimeResolver;
use crate::components::scrubber::ViewportModel;
use crate::config::SyncConfig;
use crate::events::{RangeOrigin, SyncEvent};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a boolean flag raised for as long as the guard lives.
///
/// The flags exist to break logical feedback cycles (a consumer re-entering a
/// dispatch, a chart echoing a range back), not to arbitrate threads.
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    /// Raises the flag, or returns `None` if it is already raised.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The shared cursor. `None` time means no cursor is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorState {
    pub time: Option<Millis>,
    /// Index of the nearest axis sample for `time`.
    pub index: Option<usize>,
    pub source: SourceKind,
}

/// `CursorState` plus the in-flight flag, as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSnapshot {
    pub time: Option<Millis>,
    pub index: Option<usize>,
    pub source: SourceKind,
    pub dispatching: bool,
}

/// Logical update a frame request belongs to. Viewport work runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameKey {
    Viewport,
    Cursor,
}

/// Work deferred to the next animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    Viewport(RangeOrigin),
    Cursor { time: Millis, source: SourceKind },
    ClearCursor,
}

impl FrameRequest {
    pub fn key(&self) -> FrameKey {
        match self {
            FrameRequest::Viewport(_) => FrameKey::Viewport,
            FrameRequest::Cursor { .. } | FrameRequest::ClearCursor => FrameKey::Cursor,
        }
    }
}

/// At most one pending request per key; a newer request replaces the older.
#[derive(Debug, Default)]
pub struct FrameQueue {
    pending: BTreeMap<FrameKey, FrameRequest>,
}

impl FrameQueue {
    /// Queues `request`, returning the request it cancelled, if any.
    pub fn request(&mut self, request: FrameRequest) -> Option<FrameRequest> {
        self.pending.insert(request.key(), request)
    }

    /// Takes every pending request in execution order.
    pub fn drain(&mut self) -> Vec<FrameRequest> {
        std::mem::take(&mut self.pending).into_values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

pub struct SyncContext {
    config: Arc<SyncConfig>,
    resolver: NearestTimeResolver,
    axis: RwLock<TimeAxis>,
    cursor: Mutex<CursorState>,
    pub(crate) viewport: Mutex<ViewportModel>,
    visible_range: Mutex<Option<(Millis, Millis)>>,
    pub(crate) consumers: Mutex<ConsumerRegistry>,
    frames: Mutex<FrameQueue>,
    pub(crate) dispatching: AtomicBool,
    pub(crate) applying_range: AtomicBool,
    pub(crate) updating_from_chart: AtomicBool,
    event_sender: broadcast::Sender<SyncEvent>,
}

impl SyncContext {
    pub fn new(config: SyncConfig) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let resolver = NearestTimeResolver::with_tolerance(config.resolver.tolerance_ms);
        let viewport = ViewportModel::new(config.viewport.min_width);
        Arc::new(Self {
            config: Arc::new(config),
            resolver,
            axis: RwLock::new(TimeAxis::default()),
            cursor: Mutex::new(CursorState::default()),
            viewport: Mutex::new(viewport),
            visible_range: Mutex::new(None),
            consumers: Mutex::new(ConsumerRegistry::default()),
            frames: Mutex::new(FrameQueue::default()),
            dispatching: AtomicBool::new(false),
            applying_range: AtomicBool::new(false),
            updating_from_chart: AtomicBool::new(false),
            event_sender,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn resolver(&self) -> &NearestTimeResolver {
        &self.resolver
    }

    /// The current axis. Cheap: the samples are shared, not copied.
    pub fn axis(&self) -> TimeAxis {
        self.axis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace_axis(&self, axis: TimeAxis) {
        *self.axis.write().unwrap_or_else(PoisonError::into_inner) = axis;
    }

    pub fn cursor(&self) -> CursorSnapshot {
        let state = *lock(&self.cursor);
        CursorSnapshot {
            time: state.time,
            index: state.index,
            source: state.source,
            dispatching: self.dispatching.load(Ordering::Acquire),
        }
    }

    pub(crate) fn set_cursor(&self, state: CursorState) {
        *lock(&self.cursor) = state;
    }

    pub fn visible_range(&self) -> Option<(Millis, Millis)> {
        *lock(&self.visible_range)
    }

    pub(crate) fn set_visible_range(&self, range: Option<(Millis, Millis)>) {
        *lock(&self.visible_range) = range;
    }

    /// Queues frame work; see `FrameQueue::request`.
    pub fn request_frame(&self, request: FrameRequest) -> Option<FrameRequest> {
        lock(&self.frames).request(request)
    }

    pub(crate) fn take_frame_requests(&self) -> Vec<FrameRequest> {
        lock(&self.frames).drain()
    }

    pub(crate) fn discard_frame_requests(&self) {
        lock(&self.frames).clear();
    }

    pub fn has_pending_frame(&self) -> bool {
        !lock(&self.frames).is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_sender.subscribe()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // Nobody listening is the common case outside of tooling.
        self.event_sender.send(event).ok();
    }
}
