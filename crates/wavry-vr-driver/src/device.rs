//! The streaming tracked device: lifecycle, pose queries and relay glue.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tracing::{debug, error, info, trace, warn};
use wavry_vr::{
    set_driver_status, AdapterIdentity, ClientConnection, Clock, CollaboratorFactory,
    ClientStatistics, ControllerProxy, DeviceClass, DeviceMotion, DriverHost, DriverPose, Hand,
    PoseHistory,
    PoseSample, RenderBackend, SystemClock, TrackerProxy, TrackingInfo, TrackingResult,
    ViewsConfig, VsyncSource,
};

use crate::component::{component_kind, Component, ComponentKind};
use crate::config::{DriverConfig, MAX_PREDICTION_MS};
use crate::debug::{write_response, DebugCommand, UNKNOWN_REQUEST};
use crate::display::HmdDisplay;
use crate::error::{DriverError, DriverResult};
use crate::identity::DeviceIdentity;
use crate::latency::{LatencySnapshot, LatencyStats};
use crate::pacer::FramePacer;
use crate::prediction::predict;
use crate::state::{transition, ActivationState, Lifecycle, StateCell, StreamingState};
use crate::stats::{DriverStats, StatsSnapshot};

/// Device index the host uses for "not assigned".
pub const INVALID_DEVICE_INDEX: u32 = u32::MAX;

/// Collaborators that outlive activation cycles. Dropped on shutdown.
struct Relays {
    history: Arc<dyn PoseHistory>,
    connection: Arc<dyn ClientConnection>,
    controllers: [Option<Arc<dyn ControllerProxy>>; 2],
    tracker: Option<Arc<dyn TrackerProxy>>,
}

/// State owned by whichever lifecycle transition holds the lock.
#[derive(Default)]
struct Held {
    vsync: Option<Box<dyn VsyncSource>>,
    render_initialized: bool,
}

pub struct StreamingDeviceBuilder {
    config: DriverConfig,
    factory: Arc<dyn CollaboratorFactory>,
    host: Arc<dyn DriverHost>,
    history: Arc<dyn PoseHistory>,
    connection: Arc<dyn ClientConnection>,
    controllers: [Option<Arc<dyn ControllerProxy>>; 2],
    tracker: Option<Arc<dyn TrackerProxy>>,
    render: Option<Arc<dyn RenderBackend>>,
    clock: Option<Arc<dyn Clock>>,
}

impl StreamingDeviceBuilder {
    /// Registers the proxy for the hand it reports.
    pub fn controller(mut self, proxy: Arc<dyn ControllerProxy>) -> Self {
        let slot = proxy.hand().index();
        self.controllers[slot] = Some(proxy);
        self
    }

    pub fn tracker(mut self, tracker: Arc<dyn TrackerProxy>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn render_backend(mut self, backend: Arc<dyn RenderBackend>) -> Self {
        self.render = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> DriverResult<StreamingDevice> {
        self.config.validate()?;
        let identity = DeviceIdentity::new(
            self.config.identity.serial_number.clone(),
            self.config.identity.device_class,
        );
        let offset_us = (self.config.tracking.pose_time_offset_ms * 1000.0) as i64;
        let tracking = &self.config.tracking;
        let latency = LatencyStats::new(
            tracking.latency_history,
            Duration::from_secs_f32(1.0 / self.config.display.refresh_rate_hz),
            tracking.host_pipeline_frames,
        );
        Ok(StreamingDevice {
            identity,
            display: HmdDisplay::new(self.config.display.clone()),
            factory: self.factory,
            host: self.host,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            render: self.render,
            relays: ArcSwapOption::from_pointee(Relays {
                history: self.history,
                connection: self.connection,
                controllers: self.controllers,
                tracker: self.tracker,
            }),
            pipeline: ArcSwapOption::empty(),
            adapter: OnceLock::new(),
            state: StateCell::new(ActivationState::Inactive),
            device_index: AtomicU32::new(INVALID_DEVICE_INDEX),
            pose_time_offset_us: AtomicI64::new(offset_us),
            last_pose: ArcSwapOption::empty(),
            pending_stream_start: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            lifecycle: Mutex::new(Held::default()),
            stats: Arc::new(DriverStats::default()),
            latency: Arc::new(latency),
            config: self.config,
        })
    }
}

/// One tracked device as seen by the host runtime.
///
/// Lifecycle calls (`activate`, `deactivate`, standby, streaming start/stop)
/// are serialized on an internal lock. Pose and display queries, the relay
/// entry points and vsync ticks never take that lock.
pub struct StreamingDevice {
    identity: DeviceIdentity,
    config: DriverConfig,
    display: HmdDisplay,
    factory: Arc<dyn CollaboratorFactory>,
    host: Arc<dyn DriverHost>,
    clock: Arc<dyn Clock>,
    render: Option<Arc<dyn RenderBackend>>,
    relays: ArcSwapOption<Relays>,
    pipeline: ArcSwapOption<FramePacer>,
    adapter: OnceLock<AdapterIdentity>,
    state: StateCell,
    device_index: AtomicU32,
    pose_time_offset_us: AtomicI64,
    last_pose: ArcSwapOption<DriverPose>,
    pending_stream_start: AtomicBool,
    shut_down: AtomicBool,
    lifecycle: Mutex<Held>,
    stats: Arc<DriverStats>,
    latency: Arc<LatencyStats>,
}

impl StreamingDevice {
    pub fn builder(
        config: DriverConfig,
        factory: Arc<dyn CollaboratorFactory>,
        host: Arc<dyn DriverHost>,
        history: Arc<dyn PoseHistory>,
        connection: Arc<dyn ClientConnection>,
    ) -> StreamingDeviceBuilder {
        StreamingDeviceBuilder {
            config,
            factory,
            host,
            history,
            connection,
            controllers: [None, None],
            tracker: None,
            render: None,
            clock: None,
        }
    }

    // ---- identity ----

    pub fn serial_number(&self) -> &str {
        self.identity.serial_number()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn device_class(&self) -> DeviceClass {
        self.identity.class()
    }

    pub fn is_hmd(&self) -> bool {
        self.identity.is_hmd()
    }

    pub fn is_tracking_reference(&self) -> bool {
        self.identity.is_tracking_reference()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn display(&self) -> &HmdDisplay {
        &self.display
    }

    pub fn activation_state(&self) -> ActivationState {
        self.state.load()
    }

    pub fn streaming_state(&self) -> StreamingState {
        match self.pipeline.load().as_deref() {
            Some(pacer) if pacer.is_streaming() => StreamingState::Streaming,
            _ => StreamingState::NotStreaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_state() == StreamingState::Streaming
    }

    pub fn device_index(&self) -> Option<u32> {
        match self.device_index.load(Ordering::Acquire) {
            INVALID_DEVICE_INDEX => None,
            index => Some(index),
        }
    }

    pub fn adapter(&self) -> Option<&AdapterIdentity> {
        self.adapter.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn latency(&self) -> LatencySnapshot {
        self.latency.snapshot()
    }

    /// Capability lookup by host component identifier.
    pub fn get_component(&self, name: &str) -> Option<Component<'_>> {
        match component_kind(name)? {
            ComponentKind::Display => Some(Component::Display(&self.display)),
            ComponentKind::DirectMode => {
                if self.shut_down.load(Ordering::Acquire) {
                    return None;
                }
                self.render
                    .as_ref()
                    .map(|backend| Component::DirectMode(backend.as_ref()))
            }
        }
    }

    // ---- lifecycle ----

    pub fn activate(&self, device_index: u32) -> DriverResult<()> {
        let mut held = self.lock_lifecycle();
        if self.shut_down.load(Ordering::Acquire) {
            warn!(device = %self.serial_number(), "activate after shutdown");
            return Err(DriverError::ShutDown);
        }
        let state = self.state.load();
        if transition(state, Lifecycle::Activate).is_none() {
            warn!(device = %self.serial_number(), ?state, "activate rejected");
            return Err(DriverError::InvalidStateTransition {
                op: Lifecycle::Activate.name(),
                state,
            });
        }

        self.state.store(ActivationState::Activating);
        match self.allocate(&mut held, device_index) {
            Ok(pacer) => {
                self.pipeline.store(Some(pacer));
                self.device_index.store(device_index, Ordering::Release);
                self.state.store(ActivationState::Active);
                self.stats.record_activation();
                set_driver_status(format!("Driver: {} active", self.serial_number()));
                info!(device = %self.serial_number(), device_index, "device activated");
                self.start_pending_stream(&mut held);
                Ok(())
            }
            Err(err) => {
                self.state.store(ActivationState::Inactive);
                set_driver_status(format!("Driver: {} failed to activate", self.serial_number()));
                error!(device = %self.serial_number(), %err, "activation failed");
                Err(err)
            }
        }
    }

    /// Tears down per-activation collaborators. A no-op when already inactive.
    pub fn deactivate(&self) {
        let mut held = self.lock_lifecycle();
        if self.state.load() == ActivationState::Inactive && self.pipeline.load().is_none() {
            debug!(device = %self.serial_number(), "deactivate while inactive");
            return;
        }
        self.teardown(&mut held);
        info!(device = %self.serial_number(), "device deactivated");
    }

    /// Stops streaming but keeps encoder and vsync allocated.
    pub fn enter_standby(&self) -> DriverResult<()> {
        let _held = self.lock_lifecycle();
        let state = self.state.load();
        let Some(next) = transition(state, Lifecycle::EnterStandby) else {
            debug!(device = %self.serial_number(), ?state, "enter_standby ignored");
            return Err(DriverError::InvalidStateTransition {
                op: Lifecycle::EnterStandby.name(),
                state,
            });
        };
        self.stop_streaming_locked();
        self.state.store(next);
        set_driver_status(format!("Driver: {} standby", self.serial_number()));
        info!(device = %self.serial_number(), "device entered standby");
        Ok(())
    }

    /// Returns from standby without re-allocating.
    pub fn resume(&self) -> DriverResult<()> {
        let mut held = self.lock_lifecycle();
        self.resume_locked()?;
        self.start_pending_stream(&mut held);
        Ok(())
    }

    /// Driver-wide teardown. Releases every collaborator regardless of state.
    pub fn on_shutdown(&self) {
        let mut held = self.lock_lifecycle();
        self.shut_down.store(true, Ordering::Release);
        if self.state.load() != ActivationState::Inactive || self.pipeline.load().is_some() {
            self.teardown(&mut held);
        }
        self.relays.store(None);
        self.last_pose.store(None);
        set_driver_status(format!("Driver: {} shut down", self.serial_number()));
        info!(device = %self.serial_number(), "driver shut down");
    }

    // ---- streaming ----

    pub fn start_streaming(&self) -> DriverResult<()> {
        let _held = self.lock_lifecycle();
        self.start_streaming_locked()
    }

    /// Stops streaming if it is running. Never changes the activation state.
    pub fn stop_streaming(&self) {
        let _held = self.lock_lifecycle();
        self.pending_stream_start.store(false, Ordering::Release);
        self.stop_streaming_locked();
    }

    /// The client reported it is ready to receive video.
    pub fn on_stream_start(&self) -> DriverResult<()> {
        let _held = self.lock_lifecycle();
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DriverError::ShutDown);
        }
        match self.state.load() {
            ActivationState::Active => {}
            ActivationState::Standby => self.resume_locked()?,
            state @ (ActivationState::Inactive | ActivationState::Activating) => {
                self.pending_stream_start.store(true, Ordering::Release);
                debug!(device = %self.serial_number(), ?state, "stream start queued");
                return Ok(());
            }
        }
        if self.config.streaming.start_on_client_ready {
            self.start_streaming_locked()
        } else {
            self.pending_stream_start.store(true, Ordering::Release);
            debug!(device = %self.serial_number(), "client ready, waiting for start_streaming");
            Ok(())
        }
    }

    /// Transport loss: ask for a keyframe, keep the stream running.
    pub fn on_packet_loss(&self) {
        let total = self.stats.record_packet_loss();
        warn!(device = %self.serial_number(), total, "packet loss reported");
        self.request_idr();
    }

    pub fn request_idr(&self) {
        match self.pipeline.load().as_deref() {
            Some(pacer) if pacer.request_idr() => {
                self.stats.record_keyframe_request();
                debug!(device = %self.serial_number(), "keyframe requested");
            }
            _ => trace!(device = %self.serial_number(), "keyframe request without encoder"),
        }
    }

    // ---- per-frame host queries ----

    /// Predicted pose for now plus the pose time offset. Never blocks.
    pub fn get_pose(&self) -> DriverPose {
        self.stats.record_pose_query();
        let Some(relays) = self.relays.load_full() else {
            return self.fallback_pose();
        };
        let target = self.pose_target(self.clock.now());
        let sample = relays
            .history
            .sample_at(target)
            .or_else(|| relays.history.latest());
        let Some(sample) = sample else {
            return self.fallback_pose();
        };

        let motion = predict(&sample, target, self.config.tracking.max_prediction());
        let pose = DriverPose {
            pose: motion.pose,
            velocity: motion.velocity,
            pose_is_valid: true,
            device_is_connected: true,
            tracking_result: TrackingResult::RunningOk,
        };
        self.last_pose.store(Some(Arc::new(pose)));
        pose
    }

    pub fn run_frame(&self) {
        let host_frame = self.stats.record_host_frame();
        if let Some(pacer) = self.pipeline.load().as_deref() {
            pacer.host_frame(host_frame);
            trace!(host_frame, vsync_ticks = pacer.vsync_ticks(), "host frame");
        }
    }

    /// A fresh sample landed in pose history.
    pub fn on_pose_updated(&self) {
        let pose = self.get_pose();
        let relays = self.relays.load_full();
        if let Some(index) = self.device_index() {
            self.host.pose_updated(index, &pose);
        }
        if pose.pose_is_valid {
            if let Some(tracker) = relays.as_deref().and_then(|r| r.tracker.as_ref()) {
                tracker.update(&DeviceMotion {
                    pose: pose.pose,
                    velocity: pose.velocity,
                });
            }
        }
        if let Some(pacer) = self.pipeline.load().as_deref() {
            let target = relays
                .as_deref()
                .and_then(|r| r.history.latest())
                .map(|s| s.timestamp);
            pacer.mark_pose_fresh(target);
        }
    }

    pub fn pose_time_offset(&self) -> f32 {
        self.pose_time_offset_us.load(Ordering::Relaxed) as f32 / 1000.0
    }

    /// Updates the render-to-photon compensation in milliseconds. Values
    /// outside +/-[`MAX_PREDICTION_MS`] are ignored.
    pub fn set_pose_time_offset(&self, offset_ms: f32) {
        if !(offset_ms.abs() <= MAX_PREDICTION_MS) {
            warn!(device = %self.serial_number(), offset_ms, "ignoring out-of-range pose offset");
            return;
        }
        self.pose_time_offset_us
            .store((offset_ms * 1000.0) as i64, Ordering::Relaxed);
        debug!(device = %self.serial_number(), offset_ms, "pose time offset updated");
    }

    // ---- relay entry points ----

    /// Full inbound tracking relay: head into history, then controllers.
    pub fn on_tracking(&self, info: &TrackingInfo) {
        if let Some(head) = info.head {
            let Some(relays) = self.relays.load_full() else {
                return;
            };
            relays.history.push(PoseSample {
                timestamp: info.target_timestamp,
                motion: head,
            });
            self.latency
                .report_tracking_received(info.target_timestamp, self.clock.now());
            self.on_pose_updated();
        }
        self.update_controller(info);
    }

    /// The encoder finished the frame rendered from `target_timestamp`.
    pub fn on_frame_encoded(&self, target_timestamp: Duration, bytes: usize, keyframe: bool) {
        let encode = self.latency.report_frame_encoded(
            target_timestamp,
            self.clock.now(),
            bytes,
            keyframe,
        );
        trace!(?target_timestamp, bytes, keyframe, ?encode, "frame encoded");
    }

    /// Per-frame timing report from the client. With the adaptive offset
    /// enabled the pose time offset follows the measured pipeline latency.
    pub fn on_client_statistics(&self, stats: &ClientStatistics) {
        let Some(network) = self.latency.report_client_statistics(stats) else {
            trace!(frame = ?stats.target_timestamp, "statistics for unknown frame");
            return;
        };
        trace!(?network, total = ?stats.total_pipeline_latency, "client statistics");
        if !self.config.tracking.adaptive_pose_offset {
            return;
        }
        let offset = self.latency.tracker_pose_time_offset();
        let offset_us = i64::try_from(offset.as_micros()).unwrap_or(i64::MAX);
        let previous = self.pose_time_offset_us.swap(offset_us, Ordering::Relaxed);
        if previous != offset_us {
            trace!(device = %self.serial_number(), ?offset, "adaptive pose offset");
        }
    }

    /// Forwards controller fields to the matching active proxy.
    pub fn update_controller(&self, info: &TrackingInfo) {
        let relays = self.relays.load();
        let Some(relays) = relays.as_deref() else {
            return;
        };
        for hand in [Hand::Left, Hand::Right] {
            let (Some(tracking), Some(proxy)) =
                (info.controller(hand), relays.controllers[hand.index()].as_ref())
            else {
                continue;
            };
            if !proxy.is_active() {
                trace!(?hand, "controller inactive, update dropped");
                continue;
            }
            proxy.update(tracking, info.target_timestamp);
            self.stats.record_controller_update();
        }
    }

    pub fn set_views_config(&self, views: ViewsConfig) {
        if !self.display.set_views_config(views) {
            warn!(device = %self.serial_number(), "invalid views config ignored");
            return;
        }
        self.stats.record_views_update();
        info!(device = %self.serial_number(), ipd_m = views.ipd_m(), "views config updated");
        if let Some(index) = self.device_index() {
            self.host.eye_geometry_changed(index, &views);
        }
    }

    // ---- debug ----

    /// Answers a debug command into `response`; returns the bytes written.
    pub fn debug_request(&self, request: &str, response: &mut [u8]) -> usize {
        let answer = match DebugCommand::parse(request) {
            Some(DebugCommand::Status) => format!(
                "{} state={:?} streaming={}",
                wavry_vr::driver_status(),
                self.activation_state(),
                self.is_streaming()
            ),
            Some(DebugCommand::Stats) => {
                serde_json::to_string(&self.stats.snapshot()).unwrap_or_default()
            }
            Some(DebugCommand::Views) => {
                serde_json::to_string(&*self.display.views()).unwrap_or_default()
            }
            Some(DebugCommand::Latency) => {
                serde_json::to_string(&self.latency.snapshot()).unwrap_or_default()
            }
            Some(DebugCommand::Idr) => {
                self.request_idr();
                "ok".to_string()
            }
            None => {
                debug!(device = %self.serial_number(), request, "unknown debug request");
                UNKNOWN_REQUEST.to_string()
            }
        };
        write_response(response, &answer)
    }

    // ---- internals ----

    fn lock_lifecycle(&self) -> MutexGuard<'_, Held> {
        match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn resolve_adapter(&self) -> DriverResult<AdapterIdentity> {
        if let Some(adapter) = self.adapter.get() {
            return Ok(adapter.clone());
        }
        let preferred = self.config.identity.adapter_name.as_deref();
        let adapter = self
            .factory
            .resolve_adapter(preferred)
            .map_err(|e| DriverError::init("adapter", e))?;
        info!(adapter = %adapter.name, "rendering adapter resolved");
        Ok(self.adapter.get_or_init(|| adapter).clone())
    }

    /// Allocates per-activation collaborators, releasing partial work on error.
    fn allocate(&self, held: &mut Held, device_index: u32) -> DriverResult<Arc<FramePacer>> {
        let adapter = self.resolve_adapter()?;
        self.host
            .register_display(device_index, &self.config.display.properties())
            .map_err(|e| DriverError::init("display", e))?;

        if let Some(render) = &self.render {
            render
                .initialize(&adapter)
                .map_err(|e| DriverError::init("render_backend", e))?;
            held.render_initialized = true;
        }

        let encoder = match self
            .factory
            .create_encoder(&adapter, &self.config.stream_config())
        {
            Ok(encoder) => encoder,
            Err(e) => {
                self.release_render(held);
                return Err(DriverError::init("encoder", e));
            }
        };
        let pacer = Arc::new(FramePacer::new(
            encoder,
            self.host.clone(),
            self.clock.clone(),
            self.stats.clone(),
            self.latency.clone(),
        ));

        let vsync = self
            .factory
            .create_vsync(self.config.display.refresh_rate_hz)
            .and_then(|mut vsync| vsync.start(pacer.clone()).map(|()| vsync));
        match vsync {
            Ok(vsync) => {
                held.vsync = Some(vsync);
                Ok(pacer)
            }
            Err(e) => {
                pacer.encoder().shutdown();
                self.release_render(held);
                Err(DriverError::init("vsync", e))
            }
        }
    }

    fn release_render(&self, held: &mut Held) {
        if std::mem::take(&mut held.render_initialized) {
            if let Some(render) = &self.render {
                render.shutdown();
            }
        }
    }

    /// Vsync is joined first so no tick can race the encoder stopping.
    fn teardown(&self, held: &mut Held) {
        if let Some(mut vsync) = held.vsync.take() {
            vsync.stop();
        }
        self.stop_streaming_locked();
        if let Some(pacer) = self.pipeline.swap(None) {
            pacer.release();
            pacer.encoder().shutdown();
        }
        self.release_render(held);
        self.pending_stream_start.store(false, Ordering::Release);
        self.device_index
            .store(INVALID_DEVICE_INDEX, Ordering::Release);
        self.state.store(ActivationState::Inactive);
        self.stats.record_deactivation();
        set_driver_status(format!("Driver: {} inactive", self.serial_number()));
    }

    fn resume_locked(&self) -> DriverResult<()> {
        let state = self.state.load();
        let Some(next) = transition(state, Lifecycle::Resume) else {
            return Err(DriverError::InvalidStateTransition {
                op: Lifecycle::Resume.name(),
                state,
            });
        };
        self.state.store(next);
        set_driver_status(format!("Driver: {} active", self.serial_number()));
        info!(device = %self.serial_number(), "device resumed from standby");
        Ok(())
    }

    fn start_streaming_locked(&self) -> DriverResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DriverError::ShutDown);
        }
        let state = self.state.load();
        let invalid = DriverError::InvalidStateTransition {
            op: "start_streaming",
            state,
        };
        if state != ActivationState::Active {
            return Err(invalid);
        }
        let Some(pacer) = self.pipeline.load_full() else {
            return Err(invalid);
        };
        if pacer.is_streaming() {
            return Ok(());
        }
        let Some(relays) = self.relays.load_full() else {
            return Err(DriverError::ShutDown);
        };
        if !relays.connection.is_connected() {
            return Err(DriverError::ClientNotConnected);
        }

        relays
            .connection
            .send_stream_config(&self.config.stream_config())
            .map_err(DriverError::Stream)?;
        pacer
            .encoder()
            .start(relays.connection.clone())
            .map_err(DriverError::Stream)?;
        pacer.set_streaming(true);
        self.pending_stream_start.store(false, Ordering::Release);
        set_driver_status(format!("Driver: {} streaming", self.serial_number()));
        info!(device = %self.serial_number(), "streaming started");
        Ok(())
    }

    fn stop_streaming_locked(&self) {
        let pipeline = self.pipeline.load();
        let Some(pacer) = pipeline.as_deref() else {
            return;
        };
        if !pacer.is_streaming() {
            return;
        }
        pacer.set_streaming(false);
        pacer.encoder().stop();
        info!(device = %self.serial_number(), "streaming stopped");
    }

    fn start_pending_stream(&self, _held: &mut Held) {
        if !self.config.streaming.start_on_client_ready
            || !self.pending_stream_start.load(Ordering::Acquire)
        {
            return;
        }
        let connected = self
            .relays
            .load()
            .as_deref()
            .is_some_and(|r| r.connection.is_connected());
        if !connected {
            return;
        }
        if let Err(err) = self.start_streaming_locked() {
            warn!(device = %self.serial_number(), %err, "queued stream start failed");
        }
    }

    fn pose_target(&self, now: Duration) -> Duration {
        let offset = self.pose_time_offset_us.load(Ordering::Relaxed);
        if offset >= 0 {
            now + Duration::from_micros(offset as u64)
        } else {
            now.saturating_sub(Duration::from_micros(offset.unsigned_abs()))
        }
    }

    fn fallback_pose(&self) -> DriverPose {
        self.stats.record_pose_fallback();
        self.last_pose
            .load()
            .as_deref()
            .copied()
            .unwrap_or_else(DriverPose::untracked)
    }
}

impl Drop for StreamingDevice {
    fn drop(&mut self) {
        let held = match self.lifecycle.get_mut() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        if held.vsync.is_some() || self.pipeline.load().is_some() {
            let mut held = std::mem::take(held);
            self.teardown(&mut held);
        }
    }
}
