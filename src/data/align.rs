use super::model::Timestamp;
use crate::error::{Result, SyncError};

/// A point on a time axis that the aligner can measure distances on.
///
/// Implemented for formatted log [`Timestamp`]s and for plain `f64` seconds so
/// both representations go through the same search.
pub trait TimePoint: PartialOrd {
    /// Signed distance `self - earlier` in seconds.
    fn seconds_since(&self, earlier: &Self) -> f64;
}

impl TimePoint for f64 {
    fn seconds_since(&self, earlier: &Self) -> f64 {
        self - earlier
    }
}

impl TimePoint for Timestamp {
    fn seconds_since(&self, earlier: &Self) -> f64 {
        let delta = self.instant() - earlier.instant();
        match delta.num_microseconds() {
            Some(us) => us as f64 / 1e6,
            None => delta.num_milliseconds() as f64 / 1e3,
        }
    }
}

/// Index of the item whose key is closest to `query`.
///
/// `items` must be sorted ascending by `key`. Ties go to the earlier item and
/// queries outside the covered range clamp to the first or last item.
pub fn nearest_index_by<I, T, F>(items: &[I], query: &T, key: F) -> Result<usize>
where
    T: TimePoint,
    F: Fn(&I) -> &T,
{
    if items.is_empty() {
        return Err(SyncError::EmptyDataset("alignment target".to_string()));
    }
    let idx = items.partition_point(|item| key(item) < query);
    if idx == 0 {
        return Ok(0);
    }
    if idx == items.len() {
        return Ok(items.len() - 1);
    }
    let before = key(&items[idx - 1]);
    let after = key(&items[idx]);
    if query.seconds_since(before) <= after.seconds_since(query) {
        Ok(idx - 1)
    } else {
        Ok(idx)
    }
}

/// Index of the time in `times` closest to `query`.
pub fn nearest_index<T: TimePoint>(times: &[T], query: &T) -> Result<usize> {
    nearest_index_by(times, query, |t| t)
}

/// The item whose key is closest to `query`. See [`nearest_index_by`].
pub fn nearest<'a, I, T, F>(items: &'a [I], query: &T, key: F) -> Result<&'a I>
where
    T: TimePoint,
    F: Fn(&I) -> &T,
{
    nearest_index_by(items, query, key).map(|i| &items[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::timestamp::validate;

    fn ts(s: &str) -> Timestamp {
        validate(s).unwrap()
    }

    #[test]
    fn picks_closest_float() {
        let times = [0.0, 1.0, 2.0];
        assert_eq!(nearest_index(&times, &1.4).unwrap(), 1);
        assert_eq!(nearest_index(&times, &1.6).unwrap(), 2);
    }

    #[test]
    fn ties_go_left() {
        let times = [0.0, 1.0, 2.0];
        assert_eq!(nearest_index(&times, &0.5).unwrap(), 0);
        assert_eq!(nearest_index(&times, &1.5).unwrap(), 1);
    }

    #[test]
    fn exact_match_returns_that_record() {
        let times = [0.0, 0.25, 0.5, 0.75];
        for (i, t) in times.iter().enumerate() {
            assert_eq!(nearest_index(&times, t).unwrap(), i);
        }
    }

    #[test]
    fn clamps_at_boundaries() {
        let times = [1.0, 2.0];
        assert_eq!(nearest_index(&times, &-10.0).unwrap(), 0);
        assert_eq!(nearest_index(&times, &10.0).unwrap(), 1);
    }

    #[test]
    fn empty_dataset() {
        let times: [f64; 0] = [];
        assert!(matches!(
            nearest_index(&times, &1.0),
            Err(SyncError::EmptyDataset(_))
        ));
    }

    #[test]
    fn timestamps_share_semantics() {
        let times = [
            ts("20200101_000000.000000"),
            ts("20200101_000001.000000"),
            ts("20200101_000002.000000"),
        ];
        assert_eq!(nearest_index(&times, &ts("20200101_000001.400000")).unwrap(), 1);
        assert_eq!(nearest_index(&times, &ts("20200101_000000.500000")).unwrap(), 0);
        assert_eq!(nearest_index(&times, &ts("20200101_000001.500000")).unwrap(), 1);
        assert_eq!(nearest_index(&times, &ts("20191231_235959.000000")).unwrap(), 0);
        assert_eq!(nearest_index(&times, &ts("20200102_000000.000000")).unwrap(), 2);
    }

    #[test]
    fn nearest_returns_member_with_minimal_distance() {
        let records: Vec<(f64, &str)> = vec![(0.0, "a"), (0.3, "b"), (0.35, "c"), (2.0, "d")];
        for q in [-1.0, 0.1, 0.2, 0.32, 0.33, 1.0, 1.2, 5.0] {
            let found = nearest(&records, &q, |r| &r.0).unwrap();
            let best = records
                .iter()
                .map(|r| (r.0 - q).abs())
                .fold(f64::INFINITY, f64::min);
            assert!(((found.0 - q).abs() - best).abs() < 1e-12, "query {q}");
        }
    }
}
