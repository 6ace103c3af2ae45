//! In-process stand-ins for the encoder, vsync timer, client and host.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, trace, warn};
use wavry_vr::{
    AdapterIdentity, ClientConnection, CollaboratorFactory, ControllerProxy, ControllerTracking,
    DisplayProperties, DriverHost, DriverPose, Encoder, FrameTiming, Hand, StreamConfig,
    VideoFrame, ViewsConfig, VrError, VrResult, VsyncSource, VsyncTarget,
};

const DELTA_FRAME_BYTES: usize = 2 * 1024;
const KEYFRAME_BYTES: usize = 32 * 1024;

/// Client end of the stream; counts what the encoder sends it.
#[derive(Default)]
pub struct LoopbackClient {
    connected: AtomicBool,
    frames: AtomicU64,
    keyframes: AtomicU64,
    bytes: AtomicU64,
    config: Mutex<Option<StreamConfig>>,
}

impl LoopbackClient {
    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn keyframes(&self) -> u64 {
        self.keyframes.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.config.lock().ok().and_then(|c| *c)
    }
}

impl ClientConnection for LoopbackClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_stream_config(&self, config: &StreamConfig) -> VrResult<()> {
        info!(
            codec = ?config.codec,
            width = config.width,
            height = config.height,
            refresh_hz = config.refresh_rate_hz,
            "client received stream config"
        );
        if let Ok(mut slot) = self.config.lock() {
            *slot = Some(*config);
        }
        Ok(())
    }

    fn send_video(&self, frame: VideoFrame) -> VrResult<()> {
        if !self.is_connected() {
            return Err(VrError::Transport("client disconnected".into()));
        }
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(frame.data.len() as u64, Ordering::Relaxed);
        if frame.keyframe {
            self.keyframes.fetch_add(1, Ordering::Relaxed);
        }
        trace!(frame_id = frame.frame_id, keyframe = frame.keyframe, "client frame");
        Ok(())
    }
}

/// Emits fixed-size payloads; IDR requests are coalesced into the next frame.
#[derive(Default)]
pub struct SyntheticEncoder {
    sink: Mutex<Option<Arc<dyn ClientConnection>>>,
    idr_pending: AtomicBool,
}

impl SyntheticEncoder {
    fn sink(&self) -> Option<Arc<dyn ClientConnection>> {
        self.sink.lock().ok().and_then(|s| s.clone())
    }
}

impl Encoder for SyntheticEncoder {
    fn start(&self, sink: Arc<dyn ClientConnection>) -> VrResult<()> {
        let mut slot = self
            .sink
            .lock()
            .map_err(|_| VrError::Encoder("encoder state poisoned".into()))?;
        *slot = Some(sink);
        // A new stream always opens on a keyframe.
        self.idr_pending.store(true, Ordering::Relaxed);
        debug!("synthetic encoder started");
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            slot.take();
        }
        debug!("synthetic encoder stopped");
    }

    fn present_frame(&self, timing: FrameTiming) {
        let Some(sink) = self.sink() else {
            return;
        };
        let keyframe = self.idr_pending.swap(false, Ordering::Relaxed);
        let size = if keyframe {
            KEYFRAME_BYTES
        } else {
            DELTA_FRAME_BYTES
        };
        let frame = VideoFrame {
            timestamp_us: timing.vsync_time.as_micros() as u64,
            frame_id: timing.frame_index,
            keyframe,
            data: Bytes::from(vec![0u8; size]),
        };
        if let Err(err) = sink.send_video(frame) {
            warn!(frame_index = timing.frame_index, %err, "frame dropped");
        }
    }

    fn request_idr(&self) {
        if self.idr_pending.swap(true, Ordering::Relaxed) {
            debug!("keyframe already pending, request coalesced");
        }
    }

    fn shutdown(&self) {
        self.stop();
        debug!("synthetic encoder released");
    }
}

/// Vsync timer on its own thread, paced to the display refresh rate.
pub struct ThreadVsync {
    period: Duration,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadVsync {
    pub fn new(refresh_rate_hz: f32) -> VrResult<Self> {
        if !(refresh_rate_hz.is_finite() && refresh_rate_hz > 0.0) {
            return Err(VrError::Unavailable(format!(
                "invalid refresh rate {refresh_rate_hz}"
            )));
        }
        Ok(Self {
            period: Duration::from_secs_f32(1.0 / refresh_rate_hz),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }
}

impl VsyncSource for ThreadVsync {
    fn start(&mut self, target: Arc<dyn VsyncTarget>) -> VrResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.stop.store(false, Ordering::Relaxed);
        let stop = self.stop.clone();
        let period = self.period;
        let handle = thread::Builder::new()
            .name("wavry-vsync".into())
            .spawn(move || {
                let mut next = Instant::now() + period;
                while !stop.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                    target.on_vsync();
                    next += period;
                }
            })
            .map_err(|e| VrError::Unavailable(format!("vsync thread: {e}")))?;
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadVsync {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct SimFactory;

impl CollaboratorFactory for SimFactory {
    fn resolve_adapter(&self, preferred: Option<&str>) -> VrResult<AdapterIdentity> {
        Ok(AdapterIdentity {
            name: preferred.unwrap_or("sim-gpu").to_string(),
            luid: 1,
        })
    }

    fn create_encoder(
        &self,
        adapter: &AdapterIdentity,
        config: &StreamConfig,
    ) -> VrResult<Arc<dyn Encoder>> {
        info!(adapter = %adapter.name, codec = ?config.codec, "creating synthetic encoder");
        Ok(Arc::new(SyntheticEncoder::default()))
    }

    fn create_vsync(&self, refresh_rate_hz: f32) -> VrResult<Box<dyn VsyncSource>> {
        Ok(Box::new(ThreadVsync::new(refresh_rate_hz)?))
    }
}

/// Host runtime stand-in that logs what the driver tells it.
#[derive(Default)]
pub struct LogHost {
    poses: AtomicU64,
    vsyncs: AtomicU64,
}

impl LogHost {
    pub fn poses(&self) -> u64 {
        self.poses.load(Ordering::Relaxed)
    }

    pub fn vsyncs(&self) -> u64 {
        self.vsyncs.load(Ordering::Relaxed)
    }
}

impl DriverHost for LogHost {
    fn register_display(&self, device_index: u32, properties: &DisplayProperties) -> VrResult<()> {
        info!(
            device_index,
            width = properties.render_width,
            height = properties.render_height,
            refresh_hz = properties.refresh_rate_hz,
            "host registered display"
        );
        Ok(())
    }

    fn pose_updated(&self, device_index: u32, pose: &DriverPose) {
        self.poses.fetch_add(1, Ordering::Relaxed);
        trace!(device_index, valid = pose.pose_is_valid, "host pose update");
    }

    fn vsync_event(&self) {
        self.vsyncs.fetch_add(1, Ordering::Relaxed);
    }

    fn eye_geometry_changed(&self, device_index: u32, views: &ViewsConfig) {
        info!(device_index, ipd_m = views.ipd_m(), "host eye geometry changed");
    }
}

pub struct SimController {
    hand: Hand,
    updates: AtomicU64,
}

impl SimController {
    pub fn new(hand: Hand) -> Self {
        Self {
            hand,
            updates: AtomicU64::new(0),
        }
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl ControllerProxy for SimController {
    fn hand(&self) -> Hand {
        self.hand
    }

    fn is_active(&self) -> bool {
        true
    }

    fn update(&self, tracking: &ControllerTracking, target_timestamp: Duration) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        trace!(
            hand = ?self.hand,
            buttons = tracking.input.buttons.len(),
            ?target_timestamp,
            "controller update"
        );
    }
}
