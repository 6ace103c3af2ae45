use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated from the host, relay and vsync threads.
#[derive(Debug, Default)]
pub struct DriverStats {
    activations: AtomicU64,
    deactivations: AtomicU64,
    frames_presented: AtomicU64,
    host_frames: AtomicU64,
    keyframe_requests: AtomicU64,
    packet_loss_events: AtomicU64,
    pose_queries: AtomicU64,
    pose_fallbacks: AtomicU64,
    controller_updates: AtomicU64,
    views_updates: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub activations: u64,
    pub deactivations: u64,
    pub frames_presented: u64,
    pub host_frames: u64,
    pub keyframe_requests: u64,
    pub packet_loss_events: u64,
    pub pose_queries: u64,
    pub pose_fallbacks: u64,
    pub controller_updates: u64,
    pub views_updates: u64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) -> u64 {
                self.$field.fetch_add(1, Ordering::Relaxed) + 1
            }
        )*
    };
}

impl DriverStats {
    counter! {
        record_activation => activations,
        record_deactivation => deactivations,
        record_frame_presented => frames_presented,
        record_host_frame => host_frames,
        record_keyframe_request => keyframe_requests,
        record_packet_loss => packet_loss_events,
        record_pose_query => pose_queries,
        record_pose_fallback => pose_fallbacks,
        record_controller_update => controller_updates,
        record_views_update => views_updates,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            activations: load(&self.activations),
            deactivations: load(&self.deactivations),
            frames_presented: load(&self.frames_presented),
            host_frames: load(&self.host_frames),
            keyframe_requests: load(&self.keyframe_requests),
            packet_loss_events: load(&self.packet_loss_events),
            pose_queries: load(&self.pose_queries),
            pose_fallbacks: load(&self.pose_fallbacks),
            controller_updates: load(&self.controller_updates),
            views_updates: load(&self.views_updates),
        }
    }
}
