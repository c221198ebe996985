//! The view-consumer capability and the ordered registry that holds them.

use crate::common::{ConsumerId, ConsumerRole, Millis};
use slotmap::SlotMap;

/// A view that mirrors the shared cursor.
///
/// Implementations are owned by the surrounding application. Both calls must be
/// idempotent: repeating an update with the same time shows the same state.
pub trait CursorConsumer: Send {
    /// A short label for logs.
    fn name(&self) -> &str;

    /// Repaints for the cursor at `time`; `nearest` indexes the current time axis.
    fn update(&mut self, time: Millis, nearest: usize) -> anyhow::Result<()>;

    /// Removes any cursor highlight, tooltip or label.
    fn clear(&mut self) -> anyhow::Result<()>;

    /// Chart consumers return themselves here to receive visible-range updates.
    fn as_chart(&mut self) -> Option<&mut dyn ChartConsumer> {
        None
    }
}

/// The additional capability of chart views.
pub trait ChartConsumer {
    fn set_visible_range(&mut self, start: Millis, end: Millis) -> anyhow::Result<()>;
}

pub(crate) struct Registration {
    pub role: ConsumerRole,
    pub consumer: Box<dyn CursorConsumer>,
}

/// Consumers in dispatch order.
///
/// Ordered by role first and registration order second, so two secondary
/// charts are updated in the order they were added.
#[derive(Default)]
pub struct ConsumerRegistry {
    entries: SlotMap<ConsumerId, Registration>,
    order: Vec<ConsumerId>,
}

impl ConsumerRegistry {
    pub fn insert(&mut self, role: ConsumerRole, consumer: Box<dyn CursorConsumer>) -> ConsumerId {
        let id = self.entries.insert(Registration { role, consumer });
        // Insert after every entry with the same or an earlier role.
        let position = self
            .order
            .iter()
            .position(|existing| {
                self.entries
                    .get(*existing)
                    .is_some_and(|entry| entry.role > role)
            })
            .unwrap_or(self.order.len());
        self.order.insert(position, id);
        id
    }

    pub fn remove(&mut self, id: ConsumerId) -> bool {
        if self.entries.remove(id).is_some() {
            self.order.retain(|existing| *existing != id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn role_of(&self, id: ConsumerId) -> Option<ConsumerRole> {
        self.entries.get(id).map(|entry| entry.role)
    }

    /// Ids in dispatch order.
    pub fn ids(&self) -> &[ConsumerId] {
        &self.order
    }

    pub(crate) fn get_mut(&mut self, id: ConsumerId) -> Option<&mut Registration> {
        self.entries.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl CursorConsumer for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn update(&mut self, _time: Millis, _nearest: usize) -> anyhow::Result<()> {
            Ok(())
        }
        fn clear(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn names(registry: &mut ConsumerRegistry) -> Vec<String> {
        registry
            .ids()
            .to_vec()
            .into_iter()
            .filter_map(|id| registry.get_mut(id).map(|r| r.consumer.name().to_string()))
            .collect()
    }

    #[test]
    fn test_order_is_by_role_then_registration() {
        let mut registry = ConsumerRegistry::default();
        registry.insert(ConsumerRole::FloatingLabel, Box::new(Named("label")));
        registry.insert(ConsumerRole::SecondaryChart, Box::new(Named("rpm")));
        registry.insert(ConsumerRole::MapHighlighter, Box::new(Named("map")));
        registry.insert(ConsumerRole::PrimaryChart, Box::new(Named("speed")));
        registry.insert(ConsumerRole::SecondaryChart, Box::new(Named("temp")));

        assert_eq!(names(&mut registry), ["speed", "rpm", "temp", "map", "label"]);
    }

    #[test]
    fn test_remove_drops_from_order() {
        let mut registry = ConsumerRegistry::default();
        let chart = registry.insert(ConsumerRole::PrimaryChart, Box::new(Named("speed")));
        registry.insert(ConsumerRole::FloatingLabel, Box::new(Named("label")));

        assert!(registry.remove(chart));
        assert!(!registry.remove(chart));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.role_of(chart), None);
        assert_eq!(names(&mut registry), ["label"]);
    }
}
