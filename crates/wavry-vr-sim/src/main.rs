//! Drives a streaming device through one session with simulated collaborators.

#![forbid(unsafe_code)]

mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use wavry_vr::{
    ClientStatistics, Clock, ControllerInput, ControllerTracking, DeviceMotion, Fov, Hand, Pose, PoseVelocity,
    RingPoseHistory, SystemClock, TrackingInfo, ViewsConfig,
};
use wavry_vr_driver::{DriverConfig, StreamingDevice};

use crate::sim::{LogHost, LoopbackClient, SimController, SimFactory};

#[derive(Parser, Debug)]
#[command(name = "wavry-vr-sim")]
#[command(about = "Run the Wavry VR driver against a simulated client")]
struct Args {
    /// Driver config file (JSON)
    #[arg(short, long, env = "WAVRY_VR_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after the client has received this many frames
    #[arg(short, long, default_value_t = 300)]
    frames: u64,

    /// Override the display refresh rate
    #[arg(long)]
    refresh_hz: Option<f32>,

    /// Report packet loss once this many frames have arrived
    #[arg(long)]
    loss_at: Option<u64>,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn load_config(args: &Args) -> Result<DriverConfig> {
    let mut config = match &args.config {
        Some(path) => DriverConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DriverConfig::default(),
    };
    if let Some(hz) = args.refresh_hz {
        config.display.refresh_rate_hz = hz;
        config.validate()?;
    }
    Ok(config)
}

/// Head sway around the origin, as a client would report it.
fn head_motion(t: f32) -> DeviceMotion {
    let (sin, cos) = (t * 0.5).sin_cos();
    DeviceMotion {
        pose: Pose {
            position: [0.05 * sin, 1.7, 0.0],
            orientation: Pose::IDENTITY.orientation,
        },
        velocity: PoseVelocity {
            linear: [0.025 * cos, 0.0, 0.0],
            angular: [0.0, 0.1, 0.0],
        },
    }
}

fn controller(t: f32, x: f32) -> ControllerTracking {
    ControllerTracking {
        motion: DeviceMotion {
            pose: Pose {
                position: [x, 1.2 + 0.02 * t.sin(), -0.3],
                orientation: Pose::IDENTITY.orientation,
            },
            velocity: PoseVelocity::default(),
        },
        input: ControllerInput::default(),
    }
}

/// What a client would report for the frame rendered from `target`.
fn client_report(target: Duration, frame: u64) -> ClientStatistics {
    let jitter = Duration::from_micros((frame % 7) * 250);
    ClientStatistics {
        target_timestamp: target,
        total_pipeline_latency: Duration::from_millis(28) + jitter,
        video_decode: Duration::from_millis(4),
        video_decoder_queue: Duration::from_millis(1),
        rendering: Duration::from_millis(2),
        vsync_queue: Duration::from_millis(5),
        frames_dropped: 0,
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(&args)?;
    let refresh_hz = config.display.refresh_rate_hz;

    let clock = Arc::new(SystemClock::new());
    let host = Arc::new(LogHost::default());
    let client = Arc::new(LoopbackClient::default());
    let history = Arc::new(RingPoseHistory::default());
    let left = Arc::new(SimController::new(Hand::Left));
    let right = Arc::new(SimController::new(Hand::Right));

    let device = StreamingDevice::builder(
        config,
        Arc::new(SimFactory),
        host.clone(),
        history,
        client.clone(),
    )
    .controller(left.clone())
    .controller(right.clone())
    .clock(clock.clone())
    .build()?;

    // The client announces itself before the host activates the device.
    client.connect();
    device.on_stream_start()?;
    device.activate(0)?;
    device.set_views_config(ViewsConfig::from_ipd(0.064, [Fov::default(); 2]));

    let period = Duration::from_secs_f32(1.0 / refresh_hz);
    let deadline =
        Instant::now() + period.mul_f64(args.frames as f64 * 2.0) + Duration::from_secs(2);
    let mut loss_pending = args.loss_at;
    let mut previous_target = None;

    while client.frames() < args.frames {
        if Instant::now() > deadline {
            warn!(received = client.frames(), wanted = args.frames, "simulation timed out");
            break;
        }
        let now = clock.now();
        let t = now.as_secs_f32();
        device.on_tracking(&TrackingInfo {
            target_timestamp: now,
            head: Some(head_motion(t)),
            controllers: [Some(controller(t, -0.2)), Some(controller(t, 0.2))],
        });
        // Host frame: pose query then RunFrame.
        device.get_pose();
        device.run_frame();

        // The client reports a frame once it is displayed, a frame later.
        if let Some(target) = previous_target.replace(now) {
            device.on_frame_encoded(target, 2 * 1024, false);
            device.on_client_statistics(&client_report(target, client.frames()));
        }

        if loss_pending.is_some_and(|at| client.frames() >= at) {
            loss_pending = None;
            device.on_packet_loss();
        }
        thread::sleep(period);
    }

    let stats = device.stats();
    let latency = device.latency();
    device.deactivate();
    device.on_shutdown();

    if client.stream_config().is_none() {
        bail!("client never received a stream config");
    }
    info!(
        frames = client.frames(),
        pose_offset_ms = device.pose_time_offset(),
        "session finished"
    );

    let summary = serde_json::json!({
        "driver": stats,
        "latency": latency,
        "client": {
            "frames": client.frames(),
            "keyframes": client.keyframes(),
            "bytes": client.bytes(),
        },
        "host": {
            "poses": host.poses(),
            "vsyncs": host.vsyncs(),
        },
        "controllers": {
            "left": left.updates(),
            "right": right.updates(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
