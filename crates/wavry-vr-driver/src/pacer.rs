use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use tracing::trace;
use wavry_vr::{Clock, DriverHost, Encoder, FrameTiming, VsyncTarget};

use crate::latency::LatencyStats;
use crate::stats::DriverStats;

const NO_POSE: u64 = u64::MAX;

/// Per-activation frame pipeline: turns vsync ticks into encoder frames.
///
/// Created by Activate together with its encoder and dropped by Deactivate.
/// Every call into the encoder holds the read side of `released`, so once
/// `release` returns nothing more reaches the encoder through the pacer.
pub(crate) struct FramePacer {
    encoder: Arc<dyn Encoder>,
    host: Arc<dyn DriverHost>,
    clock: Arc<dyn Clock>,
    stats: Arc<DriverStats>,
    latency: Arc<LatencyStats>,
    streaming: AtomicBool,
    released: RwLock<bool>,
    fresh_pose: AtomicBool,
    pose_target_ns: AtomicU64,
    next_frame: AtomicU64,
    vsync_ticks: AtomicU64,
}

impl FramePacer {
    pub(crate) fn new(
        encoder: Arc<dyn Encoder>,
        host: Arc<dyn DriverHost>,
        clock: Arc<dyn Clock>,
        stats: Arc<DriverStats>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self {
            encoder,
            host,
            clock,
            stats,
            latency,
            streaming: AtomicBool::new(false),
            released: RwLock::new(false),
            fresh_pose: AtomicBool::new(false),
            pose_target_ns: AtomicU64::new(NO_POSE),
            next_frame: AtomicU64::new(0),
            vsync_ticks: AtomicU64::new(0),
        }
    }

    pub(crate) fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub(crate) fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }

    /// Stop forwarding to the encoder, waiting out calls already in flight.
    /// Called before the encoder is shut down.
    pub(crate) fn release(&self) {
        let mut released = match self.released.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *released = true;
        self.streaming.store(false, Ordering::Release);
    }

    /// Read guard that is `None` once released.
    fn forwarding(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let released = match self.released.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (!*released).then_some(released)
    }

    /// Returns false once the pacer was released.
    pub(crate) fn request_idr(&self) -> bool {
        let Some(_guard) = self.forwarding() else {
            return false;
        };
        self.encoder.request_idr();
        true
    }

    pub(crate) fn host_frame(&self, host_frame: u64) {
        let Some(_guard) = self.forwarding() else {
            return;
        };
        if self.is_streaming() {
            self.encoder.on_host_frame(host_frame);
        }
    }

    pub(crate) fn mark_pose_fresh(&self, target_timestamp: Option<Duration>) {
        let ns = target_timestamp.map_or(NO_POSE, |t| {
            u64::try_from(t.as_nanos()).unwrap_or(NO_POSE - 1)
        });
        self.pose_target_ns.store(ns, Ordering::Release);
        self.fresh_pose.store(true, Ordering::Release);
    }

    fn pose_timestamp(&self) -> Option<Duration> {
        match self.pose_target_ns.load(Ordering::Acquire) {
            NO_POSE => None,
            ns => Some(Duration::from_nanos(ns)),
        }
    }

    pub(crate) fn vsync_ticks(&self) -> u64 {
        self.vsync_ticks.load(Ordering::Relaxed)
    }
}

impl VsyncTarget for FramePacer {
    fn on_vsync(&self) {
        self.vsync_ticks.fetch_add(1, Ordering::Relaxed);
        self.host.vsync_event();
        let Some(_guard) = self.forwarding() else {
            return;
        };
        if !self.is_streaming() {
            return;
        }

        let timing = FrameTiming {
            frame_index: self.next_frame.fetch_add(1, Ordering::Relaxed),
            vsync_time: self.clock.now(),
            fresh_pose: self.fresh_pose.swap(false, Ordering::AcqRel),
            pose_timestamp: self.pose_timestamp(),
        };
        if let (true, Some(target)) = (timing.fresh_pose, timing.pose_timestamp) {
            self.latency.report_frame_present(target, timing.vsync_time);
        }
        self.encoder.present_frame(timing);
        self.stats.record_frame_presented();
        trace!(frame = timing.frame_index, fresh_pose = timing.fresh_pose, "frame due");
    }
}
