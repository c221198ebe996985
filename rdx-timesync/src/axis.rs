//! The canonical time axis shared by every view.

use crate::common::Millis;
use crate::time::RawTimestamp;
use std::sync::Arc;

/// Anything that carries a (possibly unparseable) timestamp.
pub trait Timestamped {
    fn timestamp(&self) -> Option<Millis>;
}

impl Timestamped for Millis {
    fn timestamp(&self) -> Option<Millis> {
        Some(*self)
    }
}

impl Timestamped for RawTimestamp {
    fn timestamp(&self) -> Option<Millis> {
        self.to_millis()
    }
}

impl<T: Timestamped> Timestamped for Option<T> {
    fn timestamp(&self) -> Option<Millis> {
        self.as_ref().and_then(Timestamped::timestamp)
    }
}

/// An immutable, strictly increasing sequence of timestamps.
///
/// Cloning is cheap; the samples live behind an `Arc`. A new dataset produces
/// a new axis, the old one is never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeAxis {
    stamps: Arc<[Millis]>,
}

impl Default for TimeAxis {
    fn default() -> Self {
        Self {
            stamps: Arc::from(Vec::new()),
        }
    }
}

impl TimeAxis {
    pub fn builder() -> TimeAxisBuilder {
        TimeAxisBuilder::default()
    }

    /// Builds an axis straight from a single collection.
    pub fn from_items<T: Timestamped>(items: &[T]) -> Self {
        Self::builder().add_source(items).build()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn as_slice(&self) -> &[Millis] {
        &self.stamps
    }

    pub fn get(&self, index: usize) -> Option<Millis> {
        self.stamps.get(index).copied()
    }

    pub fn first(&self) -> Option<Millis> {
        self.stamps.first().copied()
    }

    pub fn last(&self) -> Option<Millis> {
        self.stamps.last().copied()
    }

    /// `(first, last)`, or `None` for an axis with no data.
    pub fn bounds(&self) -> Option<(Millis, Millis)> {
        Some((self.first()?, self.last()?))
    }

    /// Maps a fraction of the full span (0.0 = first, 1.0 = last) to a time.
    pub fn time_at_fraction(&self, fraction: f64) -> Option<Millis> {
        let (start, end) = self.bounds()?;
        Some(interpolate(start, end, fraction))
    }

    /// Inverse of `time_at_fraction`. A single-sample axis maps everything to 0.
    pub fn fraction_of(&self, time: Millis) -> Option<f64> {
        let (start, end) = self.bounds()?;
        if end == start {
            return Some(0.0);
        }
        let offset = time as f64 - start as f64;
        Some((offset / (end as f64 - start as f64)).clamp(0.0, 1.0))
    }
}

/// The time `fraction` of the way from `start` to `end`, clamped to that range.
///
/// Works in `f64` so spans wider than `i64::MAX` cannot overflow.
pub(crate) fn interpolate(start: Millis, end: Millis, fraction: f64) -> Millis {
    let span = end as f64 - start as f64;
    let time = (start as f64 + span * fraction.clamp(0.0, 1.0)).round() as Millis;
    time.clamp(start, end)
}

/// Merges timestamps from any number of heterogeneous sources.
#[derive(Debug, Default)]
pub struct TimeAxisBuilder {
    stamps: Vec<Millis>,
    dropped: usize,
}

impl TimeAxisBuilder {
    /// Adds every parseable timestamp of `items`; the rest are dropped silently.
    pub fn add_source<T: Timestamped>(mut self, items: &[T]) -> Self {
        self.extend(items.iter().map(Timestamped::timestamp));
        self
    }

    fn extend<I>(&mut self, stamps: I)
    where
        I: IntoIterator<Item = Option<Millis>>,
    {
        for stamp in stamps {
            match stamp {
                Some(ms) => self.stamps.push(ms),
                None => self.dropped += 1,
            }
        }
    }

    /// Number of items skipped so far for lacking a usable timestamp.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn build(mut self) -> TimeAxis {
        self.stamps.sort_unstable();
        self.stamps.dedup();
        TimeAxis {
            stamps: Arc::from(self.stamps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sorts_and_dedups_across_sources() {
        let speed: Vec<Millis> = vec![5000, 1000, 9000];
        let ignition = vec![
            RawTimestamp::from(2000),
            RawTimestamp::from("5000"),
            RawTimestamp::from("not a time"),
        ];
        let builder = TimeAxis::builder()
            .add_source(speed.as_slice())
            .add_source(ignition.as_slice());
        assert_eq!(builder.dropped(), 1);
        let axis = builder.build();
        assert_eq!(axis.as_slice(), &[1000, 2000, 5000, 9000]);
        assert!(axis.as_slice().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_sources_are_tolerated() {
        let empty: Vec<Millis> = Vec::new();
        let some: Vec<Millis> = vec![3, 1];
        let axis = TimeAxis::builder()
            .add_source(empty.as_slice())
            .add_source(some.as_slice())
            .build();
        assert_eq!(axis.as_slice(), &[1, 3]);

        let none = TimeAxis::builder().add_source(empty.as_slice()).build();
        assert!(none.is_empty());
        assert_eq!(none.bounds(), None);
        assert_eq!(none.time_at_fraction(0.5), None);
    }

    #[test]
    fn test_fraction_mapping() {
        let axis = TimeAxis::from_items(&[1000_i64, 3000]);
        assert_eq!(axis.time_at_fraction(0.25), Some(1500));
        assert_eq!(axis.time_at_fraction(2.0), Some(3000));
        assert_eq!(axis.fraction_of(2000), Some(0.5));

        let single = TimeAxis::from_items(&[42_i64]);
        assert_eq!(single.fraction_of(42), Some(0.0));
    }

    #[test]
    fn test_fraction_mapping_at_extreme_times() {
        let axis = TimeAxis::from_items(&[1000_i64, 3000]);
        assert_eq!(axis.fraction_of(i64::MIN), Some(0.0));
        assert_eq!(axis.fraction_of(i64::MAX), Some(1.0));

        let wide = TimeAxis::from_items(&[i64::MIN, i64::MAX]);
        assert_eq!(wide.time_at_fraction(0.0), Some(i64::MIN));
        assert_eq!(wide.time_at_fraction(1.0), Some(i64::MAX));
        assert_eq!(wide.fraction_of(i64::MIN), Some(0.0));
        assert_eq!(wide.fraction_of(i64::MAX), Some(1.0));
        let middle = wide.time_at_fraction(0.5).unwrap();
        assert!(middle.abs() <= 1 << 11, "middle {middle}");
    }
}
