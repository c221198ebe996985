//! Contains common, primitive types shared by every timesync component.
//!
//! Timestamps are plain epoch milliseconds. Consumers are identified by
//! slotmap keys so a stale id can never address a newer registration.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

/// A point in time as milliseconds since the Unix epoch.
pub type Millis = i64;

new_key_type! {
    /// Uniquely and safely identifies a registered view consumer.
    ///
    /// Returned by the engine when a consumer is registered. Keys are never
    /// reused, so an id held after `unregister` simply stops resolving.
    pub struct ConsumerId;
}

/// The view that originated a cursor update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Chart,
    Map,
    Timeline,
    #[default]
    None,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::Chart => "chart",
            SourceKind::Map => "map",
            SourceKind::Timeline => "timeline",
            SourceKind::None => "none",
        };
        f.write_str(label)
    }
}

/// The slot a consumer occupies in the dispatch order.
///
/// Variants are declared in dispatch order. Later consumers may read geometry
/// that earlier ones have just changed, so the order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerRole {
    PrimaryChart,
    SecondaryChart,
    DigitalReadout,
    AnalogReadout,
    MapHighlighter,
    TimelineMarker,
    FloatingLabel,
}

impl ConsumerRole {
    /// Position of this role in a dispatch, starting at zero.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Chart roles additionally receive visible-range updates.
    pub fn is_chart(self) -> bool {
        matches!(self, ConsumerRole::PrimaryChart | ConsumerRole::SecondaryChart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_rank_follows_dispatch_order() {
        let roles = [
            ConsumerRole::PrimaryChart,
            ConsumerRole::SecondaryChart,
            ConsumerRole::DigitalReadout,
            ConsumerRole::AnalogReadout,
            ConsumerRole::MapHighlighter,
            ConsumerRole::TimelineMarker,
            ConsumerRole::FloatingLabel,
        ];
        for pair in roles.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
        assert!(ConsumerRole::SecondaryChart.is_chart());
        assert!(!ConsumerRole::MapHighlighter.is_chart());
    }
}
