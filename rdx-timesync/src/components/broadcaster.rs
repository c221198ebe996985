//! Fans cursor updates out to every registered consumer.

use crate::common::{ConsumerId, Millis, SourceKind};
use crate::components::consumer::{ConsumerRegistry, CursorConsumer};
use crate::context::{CursorState, FlagGuard, SyncContext};
use crate::error::SyncError;
use crate::events::SyncEvent;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, MutexGuard, TryLockError};
use tracing::{debug, error, trace, warn};

/// What became of a dispatch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every consumer was invoked; `failed` of them reported an error.
    Dispatched { index: usize, failed: usize },
    /// Every consumer was told to clear.
    Cleared { failed: usize },
    /// Another dispatch was in flight. Nothing was queued.
    Dropped,
    /// The axis is empty; the cursor has nothing to point at.
    NoData,
}

/// The single writer of the shared cursor.
///
/// At most one dispatch runs at a time. A dispatch that arrives while another
/// is in flight (typically a consumer reacting to its own update) is dropped:
/// only the freshest cursor position matters, so there is nothing to queue.
#[derive(Clone)]
pub struct CursorBroadcaster {
    ctx: Arc<SyncContext>,
}

impl CursorBroadcaster {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Moves the cursor to `time` and updates every consumer, in order.
    pub fn dispatch(&self, time: Millis, source: SourceKind) -> DispatchOutcome {
        let Some(_in_flight) = FlagGuard::acquire(&self.ctx.dispatching) else {
            return self.dropped(Some(time), source);
        };
        let axis = self.ctx.axis();
        let Some(index) = self.ctx.resolver().resolve(axis.as_slice(), time) else {
            debug!("Cursor dispatch at {} ignored: no data loaded.", time);
            return DispatchOutcome::NoData;
        };
        let Some(mut registry) = self.registry() else {
            return self.dropped(Some(time), source);
        };

        self.ctx.set_cursor(CursorState {
            time: Some(time),
            index: Some(index),
            source,
        });
        let failed = self.invoke_all(&mut registry, |consumer| consumer.update(time, index));
        drop(registry);

        debug!(
            "Cursor at {} (index {}) from {} reached consumers, {} failed.",
            time, index, source, failed
        );
        self.ctx.emit(SyncEvent::CursorMoved {
            time,
            index,
            source,
        });
        DispatchOutcome::Dispatched { index, failed }
    }

    /// Hides the cursor on every consumer and resets the cursor state.
    pub fn clear(&self) -> DispatchOutcome {
        let Some(_in_flight) = FlagGuard::acquire(&self.ctx.dispatching) else {
            return self.dropped(None, SourceKind::None);
        };
        let Some(mut registry) = self.registry() else {
            return self.dropped(None, SourceKind::None);
        };

        self.ctx.set_cursor(CursorState::default());
        let failed = self.invoke_all(&mut registry, |consumer| consumer.clear());
        drop(registry);

        debug!("Cursor cleared, {} consumers failed.", failed);
        self.ctx.emit(SyncEvent::CursorCleared);
        DispatchOutcome::Cleared { failed }
    }

    /// Pushes a visible range to every chart consumer except `skip`.
    ///
    /// Returns the number of charts that failed to apply it.
    pub fn set_chart_ranges(&self, start: Millis, end: Millis, skip: Option<ConsumerId>) -> usize {
        self.set_chart_ranges_where(start, end, |id| Some(id) != skip)
    }

    /// Pushes a visible range to the chart consumers accepted by `filter`.
    pub fn set_chart_ranges_where(
        &self,
        start: Millis,
        end: Millis,
        filter: impl Fn(ConsumerId) -> bool,
    ) -> usize {
        let Some(mut registry) = self.registry() else {
            warn!("Visible range {}..{} not applied: consumers busy.", start, end);
            return 0;
        };
        let mut failed = 0;
        for id in registry.ids().to_vec() {
            if !filter(id) {
                continue;
            }
            let Some(entry) = registry.get_mut(id) else {
                continue;
            };
            if !entry.role.is_chart() {
                continue;
            }
            let applied = self.invoke(id, entry.consumer.as_mut(), |consumer| {
                let name = consumer.name().to_string();
                match consumer.as_chart() {
                    Some(chart) => chart.set_visible_range(start, end),
                    None => Err(SyncError::MissingTarget(format!("{name} visible range")).into()),
                }
            });
            if !applied {
                failed += 1;
            }
        }
        trace!("Visible range {}..{} pushed to charts.", start, end);
        failed
    }

    fn dropped(&self, time: Option<Millis>, source: SourceKind) -> DispatchOutcome {
        debug!("Dispatch from {} dropped: another dispatch is in flight.", source);
        self.ctx.emit(SyncEvent::DispatchDropped { time, source });
        DispatchOutcome::Dropped
    }

    /// Locks the registry without waiting. A held lock means a consumer is
    /// calling back into the engine from inside a dispatch.
    fn registry(&self) -> Option<MutexGuard<'_, ConsumerRegistry>> {
        match self.ctx.consumers.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn invoke_all(
        &self,
        registry: &mut ConsumerRegistry,
        mut op: impl FnMut(&mut dyn CursorConsumer) -> anyhow::Result<()>,
    ) -> usize {
        let mut failed = 0;
        for id in registry.ids().to_vec() {
            if let Some(entry) = registry.get_mut(id) {
                if !self.invoke(id, entry.consumer.as_mut(), &mut op) {
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Runs one consumer call in isolation. Errors and panics are logged and
    /// reported; they never stop the remaining consumers.
    fn invoke(
        &self,
        id: ConsumerId,
        consumer: &mut dyn CursorConsumer,
        op: impl FnOnce(&mut dyn CursorConsumer) -> anyhow::Result<()>,
    ) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| op(&mut *consumer)));
        let reason = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(err)) if is_missing_target(&err) => {
                warn!("Consumer '{}' skipped: {:#}", consumer.name(), err);
                err.to_string()
            }
            Ok(Err(err)) => {
                error!("Consumer '{}' failed: {:#}", consumer.name(), err);
                err.to_string()
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Consumer '{}' panicked: {}", consumer.name(), message);
                message
            }
        };
        self.ctx.emit(SyncEvent::ConsumerFailed {
            id,
            name: consumer.name().to_string(),
            reason,
        });
        false
    }
}

fn is_missing_target(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<SyncError>(),
            Some(SyncError::MissingTarget(_))
        )
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::TimeAxis;
    use crate::common::ConsumerRole;
    use crate::components::consumer::ChartConsumer;
    use crate::config::SyncConfig;
    use crate::context::lock;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl CursorConsumer for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn update(&mut self, time: Millis, nearest: usize) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}@{}", self.name, time, nearest));
            Ok(())
        }
        fn clear(&mut self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("{}:clear", self.name));
            Ok(())
        }
    }

    struct Failing;

    impl CursorConsumer for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn update(&mut self, _time: Millis, _nearest: usize) -> anyhow::Result<()> {
            anyhow::bail!("canvas lost")
        }
        fn clear(&mut self) -> anyhow::Result<()> {
            panic!("clear exploded")
        }
    }

    /// Re-enters the engine from inside its own update.
    struct Echo {
        broadcaster: CursorBroadcaster,
        outcomes: Arc<Mutex<Vec<DispatchOutcome>>>,
    }

    impl CursorConsumer for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn update(&mut self, time: Millis, _nearest: usize) -> anyhow::Result<()> {
            let outcome = self.broadcaster.dispatch(time + 1, SourceKind::Map);
            self.outcomes.lock().unwrap().push(outcome);
            Ok(())
        }
        fn clear(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Chart {
        log: Log,
    }

    impl CursorConsumer for Chart {
        fn name(&self) -> &str {
            "chart"
        }
        fn update(&mut self, _time: Millis, _nearest: usize) -> anyhow::Result<()> {
            Ok(())
        }
        fn clear(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn as_chart(&mut self) -> Option<&mut dyn ChartConsumer> {
            Some(self)
        }
    }

    impl ChartConsumer for Chart {
        fn set_visible_range(&mut self, start: Millis, end: Millis) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("range {start}..{end}"));
            Ok(())
        }
    }

    fn context_with_axis(stamps: &[Millis]) -> Arc<SyncContext> {
        let ctx = SyncContext::new(SyncConfig::default());
        ctx.replace_axis(TimeAxis::from_items(stamps));
        ctx
    }

    fn register(ctx: &SyncContext, role: ConsumerRole, consumer: impl CursorConsumer + 'static) {
        lock(&ctx.consumers).insert(role, Box::new(consumer));
    }

    #[test]
    fn test_dispatch_updates_consumers_in_role_order() {
        let ctx = context_with_axis(&[1000, 2000, 5000, 9000]);
        let log: Log = Arc::default();
        register(&ctx, ConsumerRole::FloatingLabel, Recorder { name: "label", log: log.clone() });
        register(&ctx, ConsumerRole::MapHighlighter, Recorder { name: "map", log: log.clone() });
        register(&ctx, ConsumerRole::PrimaryChart, Recorder { name: "chart", log: log.clone() });

        let broadcaster = CursorBroadcaster::new(ctx.clone());
        let outcome = broadcaster.dispatch(4900, SourceKind::Chart);

        assert_eq!(outcome, DispatchOutcome::Dispatched { index: 2, failed: 0 });
        assert_eq!(
            *log.lock().unwrap(),
            ["chart:4900@2", "map:4900@2", "label:4900@2"]
        );
        let cursor = ctx.cursor();
        assert_eq!(cursor.time, Some(4900));
        assert_eq!(cursor.source, SourceKind::Chart);
        assert!(!cursor.dispatching);
    }

    #[test]
    fn test_reentrant_dispatch_is_dropped() {
        let ctx = context_with_axis(&[0, 10, 20]);
        let log: Log = Arc::default();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let broadcaster = CursorBroadcaster::new(ctx.clone());
        register(
            &ctx,
            ConsumerRole::PrimaryChart,
            Echo {
                broadcaster: broadcaster.clone(),
                outcomes: outcomes.clone(),
            },
        );
        register(&ctx, ConsumerRole::FloatingLabel, Recorder { name: "label", log: log.clone() });

        let mut events = ctx.subscribe();
        broadcaster.dispatch(10, SourceKind::Chart);

        assert_eq!(*outcomes.lock().unwrap(), [DispatchOutcome::Dropped]);
        assert_eq!(*log.lock().unwrap(), ["label:10@1"]);
        assert_eq!(ctx.cursor().source, SourceKind::Chart);
        assert!(matches!(
            events.try_recv(),
            Ok(SyncEvent::DispatchDropped { time: Some(11), source: SourceKind::Map })
        ));
    }

    #[test]
    fn test_failing_consumer_does_not_block_others() {
        let ctx = context_with_axis(&[0, 10]);
        let log: Log = Arc::default();
        register(&ctx, ConsumerRole::PrimaryChart, Failing);
        register(&ctx, ConsumerRole::FloatingLabel, Recorder { name: "label", log: log.clone() });
        let broadcaster = CursorBroadcaster::new(ctx.clone());

        assert_eq!(
            broadcaster.dispatch(3, SourceKind::Timeline),
            DispatchOutcome::Dispatched { index: 0, failed: 1 }
        );
        assert_eq!(broadcaster.clear(), DispatchOutcome::Cleared { failed: 1 });
        assert_eq!(*log.lock().unwrap(), ["label:3@0", "label:clear"]);
        assert_eq!(ctx.cursor().time, None);
        assert_eq!(ctx.cursor().source, SourceKind::None);
        assert!(!ctx.cursor().dispatching);
    }

    #[test]
    fn test_empty_axis_is_no_data() {
        let ctx = SyncContext::new(SyncConfig::default());
        let log: Log = Arc::default();
        register(&ctx, ConsumerRole::PrimaryChart, Recorder { name: "chart", log: log.clone() });
        let broadcaster = CursorBroadcaster::new(ctx.clone());

        assert_eq!(broadcaster.dispatch(5, SourceKind::Chart), DispatchOutcome::NoData);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ctx.cursor().time, None);
    }

    #[test]
    fn test_chart_ranges_skip_reporter_and_non_charts() {
        let ctx = context_with_axis(&[0, 10]);
        let log: Log = Arc::default();
        register(&ctx, ConsumerRole::PrimaryChart, Chart { log: log.clone() });
        register(&ctx, ConsumerRole::SecondaryChart, Recorder { name: "no-chart", log: log.clone() });
        register(&ctx, ConsumerRole::FloatingLabel, Recorder { name: "label", log: log.clone() });
        let broadcaster = CursorBroadcaster::new(ctx.clone());

        // The recorder registered as a chart lacks the capability.
        assert_eq!(broadcaster.set_chart_ranges(2, 8, None), 1);
        assert_eq!(*log.lock().unwrap(), ["range 2..8"]);

        let primary = lock(&ctx.consumers).ids()[0];
        assert_eq!(broadcaster.set_chart_ranges(3, 7, Some(primary)), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
