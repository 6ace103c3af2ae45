//! Activation state machine and resource ownership.

mod common;

use std::sync::atomic::Ordering;
use std::thread;

use common::{Event, Harness, HarnessOptions};
use wavry_vr::DeviceClass;
use wavry_vr_driver::{
    activation_code, ActivationState, ComponentKind, DriverConfig, DriverError, InitError,
    StreamingState, DIRECT_MODE_COMPONENT_VERSION, DISPLAY_COMPONENT_VERSION,
};

fn allocations(h: &Harness) -> usize {
    h.count(|e| matches!(e, Event::EncoderCreated))
}

fn encoder_teardowns(h: &Harness) -> usize {
    h.count(|e| matches!(e, Event::EncoderShutdown))
}

#[test]
fn activate_allocates_once_and_publishes_index() {
    let h = Harness::new();
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
    assert_eq!(h.device.device_index(), None);

    h.device.activate(3).unwrap();

    assert_eq!(h.device.activation_state(), ActivationState::Active);
    assert_eq!(h.device.device_index(), Some(3));
    assert_eq!(h.device.streaming_state(), StreamingState::NotStreaming);
    assert!(h.vsync_running());
    assert_eq!(
        h.events(),
        vec![
            Event::AdapterResolved,
            Event::DisplayRegistered(3),
            Event::EncoderCreated,
            Event::VsyncCreated,
            Event::VsyncStart,
        ]
    );
}

#[test]
fn second_activate_is_rejected_without_reallocating() {
    let h = Harness::new();
    h.device.activate(0).unwrap();
    let result = h.device.activate(0);

    assert!(matches!(
        result,
        Err(DriverError::InvalidStateTransition {
            state: ActivationState::Active,
            ..
        })
    ));
    assert_eq!(activation_code(&result), InitError::AlreadyActive);
    assert_eq!(h.device.activation_state(), ActivationState::Active);
    assert_eq!(allocations(&h), 1);
}

#[test]
fn deactivate_is_idempotent() {
    let h = Harness::new();
    h.device.activate(1).unwrap();
    for _ in 0..5 {
        h.device.deactivate();
        assert_eq!(h.device.activation_state(), ActivationState::Inactive);
    }

    assert_eq!(encoder_teardowns(&h), 1);
    assert_eq!(h.count(|e| matches!(e, Event::VsyncStop)), 1);
    assert_eq!(h.device.device_index(), None);
    assert!(!h.vsync_running());
    assert_eq!(h.device.stats().deactivations, 1);
}

#[test]
fn deactivate_from_inactive_touches_nothing() {
    let h = Harness::new();
    h.device.deactivate();
    h.device.deactivate();
    assert!(h.events().is_empty());
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
}

#[test]
fn reactivation_creates_fresh_encoder_but_reuses_adapter() {
    let h = Harness::new();
    h.device.activate(0).unwrap();
    h.device.deactivate();
    h.device.activate(0).unwrap();

    assert_eq!(allocations(&h), 2);
    assert_eq!(h.count(|e| matches!(e, Event::AdapterResolved)), 1);
    assert_eq!(h.device.adapter().map(|a| a.name.as_str()), Some("mock-gpu"));
    assert_eq!(h.device.activation_state(), ActivationState::Active);
}

#[test]
fn encoder_failure_leaves_device_inactive() {
    let h = Harness::new();
    h.failures.encoder.store(true, Ordering::SeqCst);

    let result = h.device.activate(0);
    assert!(matches!(
        result,
        Err(DriverError::Initialization { stage: "encoder", .. })
    ));
    assert_eq!(activation_code(&result), InitError::DriverFailed);
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
    assert_eq!(h.device.device_index(), None);

    h.failures.encoder.store(false, Ordering::SeqCst);
    h.device.activate(0).unwrap();
    assert_eq!(h.device.activation_state(), ActivationState::Active);
}

#[test]
fn vsync_failure_releases_the_encoder() {
    let h = Harness::new();
    h.failures.vsync_start.store(true, Ordering::SeqCst);

    assert!(h.device.activate(0).is_err());
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
    assert_eq!(allocations(&h), 1);
    assert_eq!(encoder_teardowns(&h), 1);
    assert!(!h.vsync_running());

    // Nothing left to release.
    h.device.deactivate();
    assert_eq!(encoder_teardowns(&h), 1);
}

#[test]
fn render_backend_is_released_on_partial_failure() {
    let h = Harness::with(HarnessOptions {
        render_backend: true,
        ..Default::default()
    });
    h.failures.vsync_create.store(true, Ordering::SeqCst);

    assert!(h.device.activate(0).is_err());
    assert_eq!(h.count(|e| matches!(e, Event::RenderInit)), 1);
    assert_eq!(h.count(|e| matches!(e, Event::RenderShutdown)), 1);
    assert_eq!(encoder_teardowns(&h), 1);
}

#[test]
fn display_registration_failure_allocates_nothing() {
    let h = Harness::new();
    h.failures.register_display.store(true, Ordering::SeqCst);

    let err = h.device.activate(0).unwrap_err();
    assert!(matches!(err, DriverError::Initialization { stage: "display", .. }));
    assert_eq!(allocations(&h), 0);
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
}

#[test]
fn standby_keeps_resources_and_resume_reuses_them() {
    let h = Harness::new();
    h.device.activate(0).unwrap();
    h.device.start_streaming().unwrap();

    h.device.enter_standby().unwrap();
    assert_eq!(h.device.activation_state(), ActivationState::Standby);
    assert_eq!(h.device.streaming_state(), StreamingState::NotStreaming);
    assert_eq!(encoder_teardowns(&h), 0);
    assert!(h.vsync_running());

    h.device.resume().unwrap();
    assert_eq!(h.device.activation_state(), ActivationState::Active);
    assert_eq!(allocations(&h), 1);
}

#[test]
fn standby_from_inactive_is_rejected() {
    let h = Harness::new();
    assert!(h.device.enter_standby().is_err());
    assert!(h.device.resume().is_err());
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
}

#[test]
fn deactivate_from_standby_releases_everything() {
    let h = Harness::new();
    h.device.activate(0).unwrap();
    h.device.enter_standby().unwrap();
    h.device.deactivate();
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
    assert_eq!(encoder_teardowns(&h), 1);
}

#[test]
fn lifecycle_sequence_replays_transition_table() {
    let h = Harness::new();
    let steps: Vec<(&str, ActivationState)> = vec![
        ("activate", ActivationState::Active),
        ("standby", ActivationState::Standby),
        ("activate", ActivationState::Standby),
        ("resume", ActivationState::Active),
        ("standby", ActivationState::Standby),
        ("deactivate", ActivationState::Inactive),
        ("resume", ActivationState::Inactive),
        ("activate", ActivationState::Active),
    ];
    for (op, expected) in steps {
        let _ = match op {
            "activate" => h.device.activate(0),
            "standby" => h.device.enter_standby(),
            "resume" => h.device.resume(),
            _ => {
                h.device.deactivate();
                Ok(())
            }
        };
        assert_eq!(h.device.activation_state(), expected, "after {op}");
    }
    assert_eq!(allocations(&h), 2);
}

#[test]
fn shutdown_forces_teardown_and_blocks_reactivation() {
    let h = Harness::with(HarnessOptions {
        render_backend: true,
        ..Default::default()
    });
    h.device.activate(0).unwrap();
    h.device.start_streaming().unwrap();

    h.device.on_shutdown();

    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
    assert_eq!(h.device.streaming_state(), StreamingState::NotStreaming);
    assert_eq!(encoder_teardowns(&h), 1);
    assert_eq!(h.count(|e| matches!(e, Event::RenderShutdown)), 1);
    assert!(!h.vsync_running());

    let result = h.device.activate(0);
    assert!(matches!(result, Err(DriverError::ShutDown)));
    assert_eq!(activation_code(&result), InitError::ShutDown);
    assert!(h.device.get_component(DIRECT_MODE_COMPONENT_VERSION).is_none());

    h.device.on_shutdown();
    h.device.deactivate();
    assert_eq!(encoder_teardowns(&h), 1);
}

#[test]
fn dropping_an_active_device_releases_collaborators() {
    let h = Harness::new();
    h.device.activate(0).unwrap();
    let log = h.log.clone();
    drop(h);
    assert_eq!(log.count(|e| matches!(e, Event::EncoderShutdown)), 1);
    assert_eq!(log.count(|e| matches!(e, Event::VsyncStop)), 1);
}

#[test]
fn identity_comes_from_config() {
    let mut config = DriverConfig::default();
    config.identity.serial_number = "HMD-XYZ".into();
    let h = Harness::with(HarnessOptions {
        config,
        ..Default::default()
    });
    assert_eq!(h.device.serial_number(), "HMD-XYZ");
    assert_eq!(h.device.device_class(), DeviceClass::Hmd);
    assert!(h.device.is_hmd());
    assert!(!h.device.is_tracking_reference());
}

#[test]
fn component_lookup_by_identifier() {
    let h = Harness::new();
    let display = h.device.get_component(DISPLAY_COMPONENT_VERSION).unwrap();
    assert_eq!(display.kind(), ComponentKind::Display);
    assert!(h.device.get_component("IVRCameraComponent_003").is_none());
    // No render backend configured.
    assert!(h.device.get_component(DIRECT_MODE_COMPONENT_VERSION).is_none());

    let with_backend = Harness::with(HarnessOptions {
        render_backend: true,
        ..Default::default()
    });
    let direct = with_backend
        .device
        .get_component(DIRECT_MODE_COMPONENT_VERSION)
        .unwrap();
    assert_eq!(direct.kind(), ComponentKind::DirectMode);
}

#[test]
fn debug_requests_answer_without_faulting() {
    let h = Harness::new();
    h.device.activate(0).unwrap();

    let mut buf = [0u8; 256];
    let n = h.device.debug_request("status", &mut buf);
    let status = std::str::from_utf8(&buf[..n]).unwrap();
    assert!(status.contains("state=Active"), "{status}");
    assert_eq!(buf[n], 0);

    let n = h.device.debug_request("stats", &mut buf);
    let stats: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
    assert_eq!(stats["activations"], 1);

    let n = h.device.debug_request("idr", &mut buf);
    assert_eq!(&buf[..n], b"ok");
    assert_eq!(h.count(|e| matches!(e, Event::Idr)), 1);

    let n = h.device.debug_request("format c:", &mut buf);
    assert!(std::str::from_utf8(&buf[..n]).unwrap().starts_with("error"));

    let mut tiny = [0u8; 4];
    assert_eq!(h.device.debug_request("views", &mut tiny), 3);
    assert_eq!(tiny[3], 0);
    assert_eq!(h.device.debug_request("views", &mut []), 0);
}

/// Walks the log checking that `open` and `close` strictly alternate.
fn assert_paired(events: &[Event], open: &Event, close: &Event) {
    let mut depth = 0i32;
    for event in events {
        if event == open {
            depth += 1;
        } else if event == close {
            depth -= 1;
        }
        assert!((0..=1).contains(&depth), "{open:?}/{close:?} nesting {depth}");
    }
    assert_eq!(depth, 0, "{open:?} left open");
}

#[test]
fn concurrent_lifecycle_calls_pair_allocation_with_teardown() {
    let h = Harness::with(HarnessOptions {
        render_backend: true,
        ..Default::default()
    });
    thread::scope(|s| {
        for worker in 0..8u32 {
            let h = &h;
            s.spawn(move || {
                for round in 0..50 {
                    let _ = h.device.activate(worker);
                    let _ = h.device.start_streaming();
                    h.tick(1);
                    if round % 3 == 0 {
                        let _ = h.device.enter_standby();
                    }
                    h.device.stop_streaming();
                    h.device.deactivate();
                }
            });
        }
    });
    h.device.deactivate();

    let events = h.events();
    assert!(allocations(&h) > 0);
    assert_eq!(allocations(&h), encoder_teardowns(&h));
    assert_paired(&events, &Event::EncoderCreated, &Event::EncoderShutdown);
    assert_paired(&events, &Event::VsyncStart, &Event::VsyncStop);
    assert_paired(&events, &Event::RenderInit, &Event::RenderShutdown);
    assert_paired(&events, &Event::EncoderStart, &Event::EncoderStop);
    assert_eq!(h.device.activation_state(), ActivationState::Inactive);
    assert_eq!(h.device.device_index(), None);
    assert!(!h.vsync_running());
}
