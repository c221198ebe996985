//! Nearest-timestamp lookup over sorted, irregularly sampled series.

use crate::common::Millis;

/// Finds the sample closest to a target time.
///
/// The search is a binary search that remembers the closest probe it has seen.
/// Both neighbours of the target are always probed before the search ends, so
/// with a zero tolerance the result is the true nearest sample.
///
/// A non-zero tolerance lets the search stop at the first probe within that
/// distance of the target. The result is then "close enough", not necessarily
/// the closest.
///
/// Ties between two equidistant samples go to the earlier one, with or
/// without a tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NearestTimeResolver {
    tolerance_ms: u64,
}

impl NearestTimeResolver {
    pub fn exact() -> Self {
        Self { tolerance_ms: 0 }
    }

    pub fn with_tolerance(tolerance_ms: u64) -> Self {
        Self { tolerance_ms }
    }

    /// Returns the index of the nearest sample, or `None` for an empty series.
    ///
    /// Targets outside the series clamp to the first or last index.
    pub fn resolve(&self, stamps: &[Millis], target: Millis) -> Option<usize> {
        self.resolve_by(stamps, |stamp| *stamp, target)
    }

    /// Like [`resolve`](Self::resolve), over any series sorted by `key`.
    pub fn resolve_by<T>(
        &self,
        items: &[T],
        key: impl Fn(&T) -> Millis,
        target: Millis,
    ) -> Option<usize> {
        let last = items.len().checked_sub(1)?;
        if target <= key(&items[0]) {
            return Some(0);
        }
        if target >= key(&items[last]) {
            return Some(last);
        }

        // key(first) < target < key(last) from here on, so `hi` never
        // underflows and the loop always probes both neighbours.
        let (mut lo, mut hi) = (0usize, last);
        let mut best = 0usize;
        let mut best_diff = target.abs_diff(key(&items[0]));
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let stamp = key(&items[mid]);
            let diff = target.abs_diff(stamp);
            if diff < best_diff || (diff == best_diff && mid < best) {
                best = mid;
                best_diff = diff;
            }
            if diff <= self.tolerance_ms {
                return Some(self.earlier_if_tied(items, &key, target, best, best_diff));
            }
            if stamp < target {
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        Some(best)
    }

    /// An early stop may land on the later of two equidistant samples; the
    /// earlier one sits right before it.
    fn earlier_if_tied<T>(
        &self,
        items: &[T],
        key: &impl Fn(&T) -> Millis,
        target: Millis,
        best: usize,
        best_diff: u64,
    ) -> usize {
        match best.checked_sub(1) {
            Some(prev)
                if key(&items[best]) > target
                    && target.abs_diff(key(&items[prev])) == best_diff =>
            {
                prev
            }
            _ => best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(stamps: &[Millis], target: Millis) -> usize {
        let mut best = 0;
        for (i, stamp) in stamps.iter().enumerate() {
            if target.abs_diff(*stamp) < target.abs_diff(stamps[best]) {
                best = i;
            }
        }
        best
    }

    #[test]
    fn test_empty_series_is_not_found() {
        let resolver = NearestTimeResolver::exact();
        assert_eq!(resolver.resolve(&[], 0), None);
        assert_eq!(resolver.resolve(&[], i64::MAX), None);
    }

    #[test]
    fn test_out_of_range_targets_clamp() {
        let resolver = NearestTimeResolver::exact();
        let axis = [1000, 2000, 5000, 9000];
        assert_eq!(resolver.resolve(&axis, -50), Some(0));
        assert_eq!(resolver.resolve(&axis, 999), Some(0));
        assert_eq!(resolver.resolve(&axis, 9001), Some(3));
        assert_eq!(resolver.resolve(&axis, i64::MAX), Some(3));
        assert_eq!(resolver.resolve(&[7], 100), Some(0));
    }

    #[test]
    fn test_prefers_closer_later_sample() {
        let axis = [1000, 2000, 5000, 9000];
        assert_eq!(NearestTimeResolver::exact().resolve(&axis, 4900), Some(2));
        assert_eq!(
            NearestTimeResolver::with_tolerance(500).resolve(&axis, 4900),
            Some(2)
        );
    }

    #[test]
    fn test_ties_go_to_earlier_sample() {
        let resolver = NearestTimeResolver::exact();
        assert_eq!(resolver.resolve(&[1000, 2000], 1500), Some(0));
        assert_eq!(resolver.resolve(&[0, 10, 20, 30, 40], 25), Some(2));
        assert_eq!(resolver.resolve(&[0, 10, 20, 30, 40], 35), Some(3));
    }

    #[test]
    fn test_tolerance_ties_go_to_earlier_sample() {
        let resolver = NearestTimeResolver::with_tolerance(500);
        let axis = [1000, 2000, 3000, 4000, 5000];
        assert_eq!(resolver.resolve(&axis, 2500), Some(1));
        assert_eq!(resolver.resolve(&axis, 3500), Some(2));
        assert_eq!(resolver.resolve(&axis, 1500), Some(0));
        assert_eq!(resolver.resolve(&axis, 4500), Some(3));
        for target in (1000..=5000).step_by(500) {
            assert_eq!(
                resolver.resolve(&axis, target),
                NearestTimeResolver::exact().resolve(&axis, target),
                "target {target}"
            );
        }
    }

    #[test]
    fn test_resolve_by_reads_keys_in_place() {
        let rows = [(1000, 'a'), (2000, 'b'), (5000, 'c')];
        let resolver = NearestTimeResolver::exact();
        assert_eq!(resolver.resolve_by(&rows, |row| row.0, 4900), Some(2));
        assert_eq!(resolver.resolve_by(&rows, |row| row.0, 1500), Some(0));
        assert_eq!(resolver.resolve_by(&rows[..0], |row| row.0, 1500), None);
    }

    #[test]
    fn test_exact_resolution_is_minimal() {
        let axis: Vec<Millis> = vec![3, 4, 10, 11, 50, 51, 52, 90, 200, 201, 999];
        let resolver = NearestTimeResolver::exact();
        for target in -10..1100 {
            let index = resolver.resolve(&axis, target).unwrap();
            let expected = brute_force(&axis, target);
            assert_eq!(
                target.abs_diff(axis[index]),
                target.abs_diff(axis[expected]),
                "target {target}"
            );
            assert_eq!(index, expected, "tie-break for target {target}");
        }
    }

    #[test]
    fn test_tolerance_stops_within_bound() {
        let axis: Vec<Millis> = (0..1000).map(|i| i * 100).collect();
        let resolver = NearestTimeResolver::with_tolerance(500);
        for target in [12_345, 50_050, 99_999] {
            let index = resolver.resolve(&axis, target).unwrap();
            assert!(target.abs_diff(axis[index]) <= 500);
        }
    }
}
