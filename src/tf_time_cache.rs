use chrono::TimeDelta;

use crate::{tf_util::duration_to_f64, transforms, transforms::geometry_msgs::Transform};

/// How a cache answered a request, relative to its stored history.
///
/// The cache itself never rejects a request for being out of range; it
/// clamps and classifies, and the buffer applies the extrapolation
/// tolerance uniformly over a whole chain afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SampleMode {
    Exact,
    Interpolated,
    ExtrapolateBack,
    ExtrapolateForward,
    OneValue,
}

/// One parent-link observation: the child's pose in `parent_id` at `stamp`.
#[derive(Clone, Debug)]
pub(crate) struct TransformSample {
    pub(crate) stamp: TimeDelta,
    pub(crate) transform: Transform,
    pub(crate) parent_id: u32,
}

fn binary_search_stamp(samples: &[TransformSample], stamp: TimeDelta) -> Result<usize, usize> {
    samples.binary_search_by(|sample| sample.stamp.cmp(&stamp))
}

/// Bounded time-ordered history of parent links for a single child frame.
#[derive(Clone, Debug)]
pub(crate) struct TfTimeCache {
    cache_time: TimeDelta,
    samples: Vec<TransformSample>,
}

impl TfTimeCache {
    pub(crate) fn new(cache_time: TimeDelta) -> Self {
        Self {
            cache_time,
            samples: Vec::new(),
        }
    }

    /// Insert preserving time order, evicting everything older than the
    /// retention window. Returns false when the sample is strictly older
    /// than `newest - cache_time` (old data); a sample exactly on the
    /// window edge is still accepted. A duplicate stamp overwrites in place.
    pub(crate) fn insert(&mut self, sample: TransformSample) -> bool {
        if let Some(newest) = self.latest_stamp() {
            if sample.stamp < newest - self.cache_time {
                return false;
            }
        }
        match binary_search_stamp(&self.samples, sample.stamp) {
            Ok(index) => self.samples[index] = sample,
            Err(index) => self.samples.insert(index, sample),
        }
        self.prune();
        true
    }

    fn prune(&mut self) {
        if let Some(newest) = self.latest_stamp() {
            let time_to_keep = newest - self.cache_time;
            let index =
                binary_search_stamp(&self.samples, time_to_keep).unwrap_or_else(|index| index);
            self.samples.drain(..index);
        }
    }

    /// Look up the effective sample for `time`; `None` as the request time
    /// means "latest". Returns `None` when the cache is empty, or when the
    /// request falls between two samples that disagree on the parent frame
    /// (a re-parenting cannot be interpolated across, the chain is broken
    /// there).
    pub(crate) fn get(&self, time: Option<TimeDelta>) -> Option<(TransformSample, SampleMode)> {
        let newest = self.samples.last()?;
        let time = match time {
            Some(time) => time,
            None => return Some((newest.clone(), SampleMode::Exact)),
        };
        if self.samples.len() == 1 {
            return Some((newest.clone(), SampleMode::OneValue));
        }
        match binary_search_stamp(&self.samples, time) {
            Ok(index) => Some((self.samples[index].clone(), SampleMode::Exact)),
            Err(0) => Some((self.samples[0].clone(), SampleMode::ExtrapolateBack)),
            Err(index) if index >= self.samples.len() => {
                Some((newest.clone(), SampleMode::ExtrapolateForward))
            }
            Err(index) => {
                let s0 = &self.samples[index - 1];
                let s1 = &self.samples[index];
                if s0.parent_id != s1.parent_id {
                    return None;
                }
                let ratio =
                    duration_to_f64(time - s0.stamp) / duration_to_f64(s1.stamp - s0.stamp);
                let transform = transforms::interpolate(&s0.transform, &s1.transform, ratio);
                Some((
                    TransformSample {
                        stamp: time,
                        transform,
                        parent_id: s0.parent_id,
                    },
                    SampleMode::Interpolated,
                ))
            }
        }
    }

    /// Parent frame id effective at `time`, `None` request time for latest.
    pub(crate) fn parent_id(&self, time: Option<TimeDelta>) -> Option<u32> {
        self.get(time).map(|(sample, _)| sample.parent_id)
    }

    pub(crate) fn latest_stamp(&self) -> Option<TimeDelta> {
        self.samples.last().map(|sample| sample.stamp)
    }

    pub(crate) fn oldest_stamp(&self) -> Option<TimeDelta> {
        self.samples.first().map(|sample| sample.stamp)
    }

    pub(crate) fn clear_list(&mut self) {
        self.samples.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transforms::geometry_msgs::{Quaternion, Vector3};

    fn seconds(secs: i64) -> TimeDelta {
        TimeDelta::new(secs, 0).unwrap()
    }

    fn sample_at(stamp: TimeDelta, x: f64, parent_id: u32) -> TransformSample {
        TransformSample {
            stamp,
            transform: Transform {
                translation: Vector3 { x, y: 0.0, z: 0.0 },
                rotation: Quaternion {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    w: 1.0,
                },
            },
            parent_id,
        }
    }

    #[test]
    fn test_insert_sorted_and_exact() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.insert(sample_at(seconds(1), 1.0, 1)));
        assert!(cache.insert(sample_at(seconds(3), 3.0, 1)));
        assert!(cache.insert(sample_at(seconds(2), 2.0, 1)));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.oldest_stamp().unwrap(), seconds(1));
        assert_eq!(cache.latest_stamp().unwrap(), seconds(3));

        let (sample, mode) = cache.get(Some(seconds(2))).unwrap();
        assert_eq!(mode, SampleMode::Exact);
        assert_eq!(sample.transform.translation.x, 2.0);
    }

    #[test]
    fn test_duplicate_stamp_overwrites() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.insert(sample_at(seconds(1), 1.0, 1)));
        assert!(cache.insert(sample_at(seconds(2), 1.5, 1)));
        assert!(cache.insert(sample_at(seconds(1), 7.0, 1)));
        assert_eq!(cache.len(), 2);
        let (sample, mode) = cache.get(Some(seconds(1))).unwrap();
        assert_eq!(mode, SampleMode::Exact);
        assert_eq!(sample.transform.translation.x, 7.0);
    }

    #[test]
    fn test_old_data_rejected() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.insert(sample_at(seconds(100), 0.0, 1)));
        // strictly older than newest - cache_time
        assert!(!cache.insert(sample_at(seconds(89), 0.0, 1)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.latest_stamp().unwrap(), seconds(100));
        // exactly on the window edge is accepted
        assert!(cache.insert(sample_at(seconds(90), 0.0, 1)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_eviction() {
        let mut cache = TfTimeCache::new(seconds(1));
        assert!(cache.insert(sample_at(seconds(1), 1.0, 1)));
        assert!(cache.insert(sample_at(seconds(2), 2.0, 1)));
        assert_eq!(cache.len(), 2);
        assert!(cache.insert(sample_at(seconds(3), 3.0, 1)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.oldest_stamp().unwrap(), seconds(2));
        assert_eq!(cache.latest_stamp().unwrap(), seconds(3));
    }

    #[test]
    fn test_interpolation() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.insert(sample_at(seconds(1), 0.0, 1)));
        assert!(cache.insert(sample_at(seconds(2), 1.0, 1)));

        let halfway = TimeDelta::new(1, 500_000_000).unwrap();
        let (sample, mode) = cache.get(Some(halfway)).unwrap();
        assert_eq!(mode, SampleMode::Interpolated);
        assert_eq!(sample.stamp, halfway);
        assert_eq!(sample.parent_id, 1);
        assert!((sample.transform.translation.x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_extrapolation_modes() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.get(None).is_none());
        assert!(cache.get(Some(seconds(1))).is_none());

        assert!(cache.insert(sample_at(seconds(5), 5.0, 1)));
        let (sample, mode) = cache.get(Some(seconds(2))).unwrap();
        assert_eq!(mode, SampleMode::OneValue);
        assert_eq!(sample.stamp, seconds(5));

        assert!(cache.insert(sample_at(seconds(6), 6.0, 1)));
        let (sample, mode) = cache.get(Some(seconds(2))).unwrap();
        assert_eq!(mode, SampleMode::ExtrapolateBack);
        assert_eq!(sample.stamp, seconds(5));

        let (sample, mode) = cache.get(Some(seconds(9))).unwrap();
        assert_eq!(mode, SampleMode::ExtrapolateForward);
        assert_eq!(sample.stamp, seconds(6));
    }

    #[test]
    fn test_latest_request() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.insert(sample_at(seconds(1), 1.0, 1)));
        assert!(cache.insert(sample_at(seconds(2), 2.0, 1)));
        let (sample, mode) = cache.get(None).unwrap();
        assert_eq!(mode, SampleMode::Exact);
        assert_eq!(sample.stamp, seconds(2));
        assert_eq!(sample.transform.translation.x, 2.0);
    }

    #[test]
    fn test_parent_change_breaks_interpolation() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.insert(sample_at(seconds(1), 1.0, 1)));
        assert!(cache.insert(sample_at(seconds(2), 2.0, 2)));

        // exact stamps still resolve to their own parent
        assert_eq!(cache.parent_id(Some(seconds(1))).unwrap(), 1);
        assert_eq!(cache.parent_id(Some(seconds(2))).unwrap(), 2);

        // in between there is no interpolable link
        let halfway = TimeDelta::new(1, 500_000_000).unwrap();
        assert!(cache.get(Some(halfway)).is_none());
    }

    #[test]
    fn test_clear_list() {
        let mut cache = TfTimeCache::new(seconds(10));
        assert!(cache.insert(sample_at(seconds(1), 1.0, 1)));
        cache.clear_list();
        assert_eq!(cache.len(), 0);
        assert!(cache.get(None).is_none());
    }
}
