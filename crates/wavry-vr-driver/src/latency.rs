//! Motion-to-photon bookkeeping for one device.
//!
//! Each tracking sample that reaches the driver opens a history frame keyed
//! by its target timestamp. The vsync and encoder paths stamp the frame as it
//! moves through the pipeline, and the client's per-frame report closes it.
//! Averages over the last `capacity` reports drive the adaptive pose offset.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use wavry_vr::ClientStatistics;

struct SlidingAverage {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl SlidingAverage {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn submit(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.samples.iter().sum();
        sum.div_f64(self.samples.len() as f64)
    }
}

#[derive(Debug, Clone, Copy)]
struct HistoryFrame {
    target_timestamp: Duration,
    tracking_received: Duration,
    presented: Option<Duration>,
    encoded: Option<Duration>,
    bytes: usize,
    keyframe: bool,
}

struct Inner {
    history: VecDeque<HistoryFrame>,
    capacity: usize,
    total: SlidingAverage,
    game: SlidingAverage,
    encode: SlidingAverage,
    network: SlidingAverage,
    decode: SlidingAverage,
    reports: u64,
    frames_dropped: u64,
}

impl Inner {
    fn frame_mut(&mut self, target_timestamp: Duration) -> Option<&mut HistoryFrame> {
        self.history
            .iter_mut()
            .find(|f| f.target_timestamp == target_timestamp)
    }
}

/// Averages exposed over the debug channel and the sim summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub total_pipeline_ms: f32,
    pub game_ms: f32,
    pub encode_ms: f32,
    pub network_ms: f32,
    pub decode_ms: f32,
    pub host_pipeline_ms: f32,
    pub pose_time_offset_ms: f32,
    pub reports: u64,
    pub frames_dropped: u64,
    pub history_len: usize,
}

/// Bounded frame history plus sliding averages of each pipeline stage.
///
/// All timestamps are on the driver clock. Calls come from the relay, vsync
/// and encoder threads; the lock is held only for the bookkeeping itself.
pub struct LatencyStats {
    host_pipeline: Duration,
    inner: Mutex<Inner>,
}

impl LatencyStats {
    /// `host_pipeline_frames` display intervals are budgeted for the host
    /// compositor between a pose query and scan-out.
    pub fn new(capacity: usize, frame_interval: Duration, host_pipeline_frames: f32) -> Self {
        let capacity = capacity.max(1);
        let host_pipeline =
            Duration::try_from_secs_f32(host_pipeline_frames * frame_interval.as_secs_f32())
                .unwrap_or(Duration::ZERO);
        Self {
            host_pipeline,
            inner: Mutex::new(Inner {
                history: VecDeque::with_capacity(capacity),
                capacity,
                total: SlidingAverage::new(capacity),
                game: SlidingAverage::new(capacity),
                encode: SlidingAverage::new(capacity),
                network: SlidingAverage::new(capacity),
                decode: SlidingAverage::new(capacity),
                reports: 0,
                frames_dropped: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn host_pipeline_latency(&self) -> Duration {
        self.host_pipeline
    }

    /// A tracking sample for `target_timestamp` arrived at `now`. Repeated
    /// timestamps keep the first arrival.
    pub fn report_tracking_received(&self, target_timestamp: Duration, now: Duration) {
        let mut inner = self.lock();
        if inner.frame_mut(target_timestamp).is_some() {
            return;
        }
        inner.history.push_front(HistoryFrame {
            target_timestamp,
            tracking_received: now,
            presented: None,
            encoded: None,
            bytes: 0,
            keyframe: false,
        });
        let capacity = inner.capacity;
        inner.history.truncate(capacity);
    }

    pub fn report_frame_present(&self, target_timestamp: Duration, now: Duration) {
        if let Some(frame) = self.lock().frame_mut(target_timestamp) {
            frame.presented.get_or_insert(now);
        }
    }

    /// Returns the time the frame spent in the encoder, or `None` for an
    /// unknown or never-presented frame.
    pub fn report_frame_encoded(
        &self,
        target_timestamp: Duration,
        now: Duration,
        bytes: usize,
        keyframe: bool,
    ) -> Option<Duration> {
        let mut inner = self.lock();
        let frame = inner.frame_mut(target_timestamp)?;
        frame.encoded = Some(now);
        frame.bytes = bytes;
        frame.keyframe = keyframe;
        frame.presented.map(|p| now.saturating_sub(p))
    }

    /// Folds one client report into the averages and returns the network
    /// share of the total latency. Reports for frames that already left the
    /// history are ignored.
    pub fn report_client_statistics(&self, stats: &ClientStatistics) -> Option<Duration> {
        let mut inner = self.lock();
        let frame = *inner.frame_mut(stats.target_timestamp)?;

        let presented = frame.presented.unwrap_or(frame.tracking_received);
        let game = presented.saturating_sub(frame.tracking_received);
        let encode = frame
            .encoded
            .map_or(Duration::ZERO, |e| e.saturating_sub(presented));
        // Whatever the stage timings do not account for is attributed to
        // the network, both directions.
        let network = stats.total_pipeline_latency.saturating_sub(
            game + encode
                + stats.video_decode
                + stats.video_decoder_queue
                + stats.rendering
                + stats.vsync_queue,
        );

        inner.total.submit(stats.total_pipeline_latency);
        inner.game.submit(game);
        inner.encode.submit(encode);
        inner.network.submit(network);
        inner.decode.submit(stats.video_decode);
        inner.reports += 1;
        inner.frames_dropped += u64::from(stats.frames_dropped);
        Some(network)
    }

    pub fn total_pipeline_latency(&self) -> Duration {
        self.lock().total.average()
    }

    /// How far past the client's prediction the host should sample poses:
    /// the host's own pipeline minus what the client already covered.
    pub fn tracker_pose_time_offset(&self) -> Duration {
        self.host_pipeline
            .saturating_sub(self.total_pipeline_latency())
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let inner = self.lock();
        let ms = |d: Duration| d.as_secs_f32() * 1000.0;
        let total = inner.total.average();
        LatencySnapshot {
            total_pipeline_ms: ms(total),
            game_ms: ms(inner.game.average()),
            encode_ms: ms(inner.encode.average()),
            network_ms: ms(inner.network.average()),
            decode_ms: ms(inner.decode.average()),
            host_pipeline_ms: ms(self.host_pipeline),
            pose_time_offset_ms: ms(self.host_pipeline.saturating_sub(total)),
            reports: inner.reports,
            frames_dropped: inner.frames_dropped,
            history_len: inner.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn report(target: Duration, total: Duration) -> ClientStatistics {
        ClientStatistics {
            target_timestamp: target,
            total_pipeline_latency: total,
            video_decode: ms(2),
            video_decoder_queue: ms(1),
            rendering: ms(1),
            vsync_queue: ms(1),
            frames_dropped: 0,
        }
    }

    #[test]
    fn history_is_bounded_and_drops_oldest() {
        let stats = LatencyStats::new(4, ms(10), 2.0);
        for i in 0..10 {
            stats.report_tracking_received(ms(i), ms(i));
        }
        assert_eq!(stats.snapshot().history_len, 4);
        // Frame 0 fell out of history, so its report is ignored.
        assert_eq!(stats.report_client_statistics(&report(ms(0), ms(20))), None);
        assert!(stats.report_client_statistics(&report(ms(9), ms(20))).is_some());
    }

    #[test]
    fn duplicate_tracking_keeps_first_arrival() {
        let stats = LatencyStats::new(8, ms(10), 2.0);
        stats.report_tracking_received(ms(100), ms(1));
        stats.report_tracking_received(ms(100), ms(5));
        stats.report_frame_present(ms(100), ms(4));
        stats.report_client_statistics(&report(ms(100), ms(30)));
        assert_eq!(stats.snapshot().history_len, 1);
        assert!((stats.snapshot().game_ms - 3.0).abs() < 1e-3);
    }

    #[test]
    fn network_latency_is_the_unaccounted_remainder() {
        let stats = LatencyStats::new(8, ms(10), 2.0);
        stats.report_tracking_received(ms(50), ms(0));
        stats.report_frame_present(ms(50), ms(4));
        assert_eq!(
            stats.report_frame_encoded(ms(50), ms(7), 2048, false),
            Some(ms(3))
        );
        // game 4 + encode 3 + client stages 5 = 12 of 30.
        let network = stats.report_client_statistics(&report(ms(50), ms(30)));
        assert_eq!(network, Some(ms(18)));
    }

    #[test]
    fn stage_sum_over_total_saturates_to_zero() {
        let stats = LatencyStats::new(8, ms(10), 2.0);
        stats.report_tracking_received(ms(50), ms(0));
        stats.report_frame_present(ms(50), ms(40));
        let network = stats.report_client_statistics(&report(ms(50), ms(10)));
        assert_eq!(network, Some(Duration::ZERO));
    }

    #[test]
    fn pose_offset_is_host_pipeline_minus_average_total() {
        let stats = LatencyStats::new(8, ms(10), 2.0);
        assert_eq!(stats.host_pipeline_latency(), ms(20));
        for (i, total) in [4u64, 8].into_iter().enumerate() {
            let target = ms(i as u64);
            stats.report_tracking_received(target, target);
            stats.report_client_statistics(&report(target, ms(total)));
        }
        assert_eq!(stats.total_pipeline_latency(), ms(6));
        assert_eq!(stats.tracker_pose_time_offset(), ms(14));
    }

    #[test]
    fn pose_offset_never_goes_negative() {
        let stats = LatencyStats::new(8, ms(10), 1.0);
        stats.report_tracking_received(ms(1), ms(1));
        stats.report_client_statistics(&report(ms(1), ms(80)));
        assert_eq!(stats.tracker_pose_time_offset(), Duration::ZERO);
    }

    #[test]
    fn averages_cover_only_the_last_capacity_reports() {
        let stats = LatencyStats::new(2, ms(10), 4.0);
        for (i, total) in [100u64, 10, 20].into_iter().enumerate() {
            let target = ms(i as u64);
            stats.report_tracking_received(target, target);
            stats.report_client_statistics(&report(target, ms(total)));
        }
        assert_eq!(stats.total_pipeline_latency(), ms(15));
        assert_eq!(stats.snapshot().reports, 3);
    }

    #[test]
    fn encoded_report_for_unknown_frame_is_ignored() {
        let stats = LatencyStats::new(8, ms(10), 2.0);
        assert_eq!(stats.report_frame_encoded(ms(3), ms(4), 10, true), None);
        stats.report_tracking_received(ms(3), ms(3));
        assert_eq!(stats.report_frame_encoded(ms(3), ms(4), 10, true), None);
    }
}
