use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::collaborators::PoseHistory;
use crate::types::PoseSample;

/// Default number of samples kept, about one second of 360 Hz tracking.
pub const DEFAULT_POSE_HISTORY_CAPACITY: usize = 360;

/// Bounded, timestamp-ordered pose history.
pub struct RingPoseHistory {
    samples: Mutex<VecDeque<PoseSample>>,
    capacity: usize,
}

impl RingPoseHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PoseSample>> {
        match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for RingPoseHistory {
    fn default() -> Self {
        Self::new(DEFAULT_POSE_HISTORY_CAPACITY)
    }
}

impl PoseHistory for RingPoseHistory {
    fn push(&self, sample: PoseSample) {
        let mut samples = self.lock();
        let idx = samples.partition_point(|s| s.timestamp < sample.timestamp);
        match samples.get_mut(idx) {
            Some(existing) if existing.timestamp == sample.timestamp => *existing = sample,
            _ => samples.insert(idx, sample),
        }
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    fn sample_at(&self, timestamp: Duration) -> Option<PoseSample> {
        let samples = self.lock();
        let idx = samples.partition_point(|s| s.timestamp <= timestamp);
        idx.checked_sub(1).and_then(|i| samples.get(i).copied())
    }

    fn latest(&self) -> Option<PoseSample> {
        self.lock().back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceMotion;

    fn sample(ms: u64, x: f32) -> PoseSample {
        let mut motion = DeviceMotion::default();
        motion.pose.position[0] = x;
        PoseSample {
            timestamp: Duration::from_millis(ms),
            motion,
        }
    }

    #[test]
    fn empty_history_has_no_samples() {
        let history = RingPoseHistory::new(4);
        assert!(history.is_empty());
        assert!(history.latest().is_none());
        assert!(history.sample_at(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn sample_at_picks_newest_not_after_target() {
        let history = RingPoseHistory::new(8);
        history.push(sample(10, 1.0));
        history.push(sample(20, 2.0));
        history.push(sample(30, 3.0));

        let hit = history.sample_at(Duration::from_millis(25)).unwrap();
        assert_eq!(hit.timestamp, Duration::from_millis(20));
        let exact = history.sample_at(Duration::from_millis(30)).unwrap();
        assert_eq!(exact.motion.pose.position[0], 3.0);
        assert!(history.sample_at(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let history = RingPoseHistory::new(2);
        history.push(sample(1, 1.0));
        history.push(sample(2, 2.0));
        history.push(sample(3, 3.0));
        assert_eq!(history.len(), 2);
        assert!(history.sample_at(Duration::from_millis(1)).is_none());
        assert_eq!(history.latest().unwrap().timestamp, Duration::from_millis(3));
    }

    #[test]
    fn out_of_order_and_duplicate_timestamps_stay_sorted() {
        let history = RingPoseHistory::new(8);
        history.push(sample(30, 3.0));
        history.push(sample(10, 1.0));
        history.push(sample(10, 1.5));
        assert_eq!(history.len(), 2);
        let first = history.sample_at(Duration::from_millis(15)).unwrap();
        assert_eq!(first.motion.pose.position[0], 1.5);
        assert_eq!(history.latest().unwrap().timestamp, Duration::from_millis(30));
    }
}
