//! Recording mock collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wavry_vr::{
    AdapterIdentity, ClientConnection, Clock, CollaboratorFactory, ControllerProxy,
    ControllerTracking, DeviceMotion, DisplayProperties, DriverHost, DriverPose, Encoder,
    FrameTiming, Hand, RenderBackend, RingPoseHistory, StreamConfig, TrackerProxy, VideoFrame,
    ViewsConfig, VrError, VrResult, VsyncSource, VsyncTarget,
};
use wavry_vr_driver::{DriverConfig, DriverResult, StreamingDevice};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AdapterResolved,
    DisplayRegistered(u32),
    RenderInit,
    RenderShutdown,
    EncoderCreated,
    EncoderStart,
    EncoderStop,
    Frame(u64),
    HostFrame(u64),
    Idr,
    EncoderShutdown,
    VsyncCreated,
    VsyncStart,
    VsyncStop,
    StreamConfigSent,
    PoseUpdated(u32),
    EyeGeometry(u32),
    Controller(Hand),
    Tracker,
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub struct MockEncoder {
    log: EventLog,
}

impl Encoder for MockEncoder {
    fn start(&self, _sink: Arc<dyn ClientConnection>) -> VrResult<()> {
        self.log.push(Event::EncoderStart);
        Ok(())
    }

    fn stop(&self) {
        self.log.push(Event::EncoderStop);
    }

    fn present_frame(&self, timing: FrameTiming) {
        self.log.push(Event::Frame(timing.frame_index));
    }

    fn on_host_frame(&self, host_frame: u64) {
        self.log.push(Event::HostFrame(host_frame));
    }

    fn request_idr(&self) {
        self.log.push(Event::Idr);
    }

    fn shutdown(&self) {
        self.log.push(Event::EncoderShutdown);
    }
}

pub type VsyncSlot = Arc<Mutex<Option<Arc<dyn VsyncTarget>>>>;

pub struct MockVsync {
    log: EventLog,
    slot: VsyncSlot,
    fail_start: bool,
}

impl VsyncSource for MockVsync {
    fn start(&mut self, target: Arc<dyn VsyncTarget>) -> VrResult<()> {
        if self.fail_start {
            return Err(VrError::Unavailable("vsync timer".into()));
        }
        self.log.push(Event::VsyncStart);
        *self.slot.lock().unwrap() = Some(target);
        Ok(())
    }

    fn stop(&mut self) {
        if self.slot.lock().unwrap().take().is_some() {
            self.log.push(Event::VsyncStop);
        }
    }
}

/// Vsync timer that ticks from its own thread, like a real display clock.
pub struct ThreadedVsync {
    log: EventLog,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VsyncSource for ThreadedVsync {
    fn start(&mut self, target: Arc<dyn VsyncTarget>) -> VrResult<()> {
        self.log.push(Event::VsyncStart);
        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        self.handle = Some(thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                target.on_vsync();
                thread::sleep(Duration::from_micros(200));
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
            self.log.push(Event::VsyncStop);
        }
    }
}

#[derive(Default)]
pub struct Failures {
    pub adapter: AtomicBool,
    pub encoder: AtomicBool,
    pub vsync_create: AtomicBool,
    pub vsync_start: AtomicBool,
    pub register_display: AtomicBool,
    pub render_init: AtomicBool,
}

pub struct MockFactory {
    log: EventLog,
    slot: VsyncSlot,
    failures: Arc<Failures>,
    threaded_vsync: bool,
}

impl CollaboratorFactory for MockFactory {
    fn resolve_adapter(&self, preferred: Option<&str>) -> VrResult<AdapterIdentity> {
        if self.failures.adapter.load(Ordering::SeqCst) {
            return Err(VrError::Adapter("no adapter".into()));
        }
        self.log.push(Event::AdapterResolved);
        Ok(AdapterIdentity {
            name: preferred.unwrap_or("mock-gpu").to_string(),
            luid: 7,
        })
    }

    fn create_encoder(
        &self,
        _adapter: &AdapterIdentity,
        _config: &StreamConfig,
    ) -> VrResult<Arc<dyn Encoder>> {
        if self.failures.encoder.load(Ordering::SeqCst) {
            return Err(VrError::Encoder("no encoder".into()));
        }
        self.log.push(Event::EncoderCreated);
        Ok(Arc::new(MockEncoder {
            log: self.log.clone(),
        }))
    }

    fn create_vsync(&self, _refresh_rate_hz: f32) -> VrResult<Box<dyn VsyncSource>> {
        if self.failures.vsync_create.load(Ordering::SeqCst) {
            return Err(VrError::Unavailable("no timer".into()));
        }
        self.log.push(Event::VsyncCreated);
        if self.threaded_vsync {
            return Ok(Box::new(ThreadedVsync {
                log: self.log.clone(),
                stop: Arc::new(AtomicBool::new(false)),
                handle: None,
            }));
        }
        Ok(Box::new(MockVsync {
            log: self.log.clone(),
            slot: self.slot.clone(),
            fail_start: self.failures.vsync_start.load(Ordering::SeqCst),
        }))
    }
}

pub struct MockHost {
    log: EventLog,
    failures: Arc<Failures>,
}

impl DriverHost for MockHost {
    fn register_display(&self, device_index: u32, _properties: &DisplayProperties) -> VrResult<()> {
        if self.failures.register_display.load(Ordering::SeqCst) {
            return Err(VrError::Host("register rejected".into()));
        }
        self.log.push(Event::DisplayRegistered(device_index));
        Ok(())
    }

    fn pose_updated(&self, device_index: u32, _pose: &DriverPose) {
        self.log.push(Event::PoseUpdated(device_index));
    }

    fn eye_geometry_changed(&self, device_index: u32, _views: &ViewsConfig) {
        self.log.push(Event::EyeGeometry(device_index));
    }
}

pub struct MockConnection {
    log: EventLog,
    pub connected: AtomicBool,
}

impl ClientConnection for MockConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_stream_config(&self, _config: &StreamConfig) -> VrResult<()> {
        self.log.push(Event::StreamConfigSent);
        Ok(())
    }

    fn send_video(&self, _frame: VideoFrame) -> VrResult<()> {
        Ok(())
    }
}

pub struct MockController {
    log: EventLog,
    hand: Hand,
    pub active: AtomicBool,
}

impl ControllerProxy for MockController {
    fn hand(&self) -> Hand {
        self.hand
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn update(&self, _tracking: &ControllerTracking, _target_timestamp: Duration) {
        self.log.push(Event::Controller(self.hand));
    }
}

pub struct MockTracker {
    log: EventLog,
}

impl TrackerProxy for MockTracker {
    fn update(&self, _motion: &DeviceMotion) {
        self.log.push(Event::Tracker);
    }
}

pub struct MockRender {
    log: EventLog,
    failures: Arc<Failures>,
}

impl RenderBackend for MockRender {
    fn name(&self) -> &str {
        "mock-direct"
    }

    fn initialize(&self, _adapter: &AdapterIdentity) -> VrResult<()> {
        if self.failures.render_init.load(Ordering::SeqCst) {
            return Err(VrError::Adapter("render init".into()));
        }
        self.log.push(Event::RenderInit);
        Ok(())
    }

    fn shutdown(&self) {
        self.log.push(Event::RenderShutdown);
    }
}

#[derive(Default)]
pub struct ManualClock(Mutex<Duration>);

impl ManualClock {
    pub fn set(&self, now: Duration) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.0.lock().unwrap()
    }
}

pub struct Harness {
    pub device: StreamingDevice,
    pub log: EventLog,
    pub failures: Arc<Failures>,
    pub connection: Arc<MockConnection>,
    pub history: Arc<RingPoseHistory>,
    pub clock: Arc<ManualClock>,
    pub left: Arc<MockController>,
    pub right: Arc<MockController>,
    slot: VsyncSlot,
}

#[derive(Default)]
pub struct HarnessOptions {
    pub config: DriverConfig,
    pub render_backend: bool,
    pub tracker: bool,
    /// Tick from a background thread instead of [`Harness::tick`].
    pub threaded_vsync: bool,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HarnessOptions::default())
    }

    pub fn with(options: HarnessOptions) -> Self {
        Self::try_with(options).unwrap()
    }

    pub fn try_with(options: HarnessOptions) -> DriverResult<Self> {
        let log = EventLog::default();
        let failures = Arc::new(Failures::default());
        let slot: VsyncSlot = Arc::new(Mutex::new(None));
        let connection = Arc::new(MockConnection {
            log: log.clone(),
            connected: AtomicBool::new(true),
        });
        let history = Arc::new(RingPoseHistory::new(64));
        let clock = Arc::new(ManualClock::default());
        let controller = |hand| {
            Arc::new(MockController {
                log: log.clone(),
                hand,
                active: AtomicBool::new(true),
            })
        };
        let left = controller(Hand::Left);
        let right = controller(Hand::Right);

        let factory = Arc::new(MockFactory {
            log: log.clone(),
            slot: slot.clone(),
            failures: failures.clone(),
            threaded_vsync: options.threaded_vsync,
        });
        let host = Arc::new(MockHost {
            log: log.clone(),
            failures: failures.clone(),
        });

        let mut builder = StreamingDevice::builder(
            options.config,
            factory,
            host,
            history.clone(),
            connection.clone(),
        )
        .controller(left.clone())
        .controller(right.clone())
        .clock(clock.clone());
        if options.render_backend {
            builder = builder.render_backend(Arc::new(MockRender {
                log: log.clone(),
                failures: failures.clone(),
            }));
        }
        if options.tracker {
            builder = builder.tracker(Arc::new(MockTracker { log: log.clone() }));
        }

        Ok(Self {
            device: builder.build()?,
            log,
            failures,
            connection,
            history,
            clock,
            left,
            right,
            slot,
        })
    }

    /// Fires `n` vsync ticks on the running timer; does nothing when stopped.
    pub fn tick(&self, n: usize) {
        for _ in 0..n {
            let target = self.slot.lock().unwrap().clone();
            if let Some(target) = target {
                target.on_vsync();
            }
        }
    }

    pub fn vsync_running(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.events()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.log.count(pred)
    }
}
