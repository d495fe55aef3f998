//! Integration tests: a full device session against the loopback hub.
//!
//! The session runs its real threads (render loops, method and patch
//! listeners); the test plays the cloud side through `LocalHub` and watches
//! the strip through `MockDisplay`.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ledtwin_lib::display::mock::MockDisplay;
use ledtwin_lib::hub::local::LocalHub;
use ledtwin_lib::led::{LED_COUNT, LedRegistry, Rgb};
use ledtwin_lib::reconnect::{ReconnectConfig, ReconnectState};
use ledtwin_lib::render::RenderTimings;
use ledtwin_lib::session::{DeviceSession, SessionSettings};
use ledtwin_lib::telemetry::{self, SensorSimulator};
use ledtwin_lib::twin::{self, PropertyMap};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};

const WAIT: Duration = Duration::from_secs(5);

type Session = DeviceSession<LocalHub, MockDisplay>;

fn settings() -> SessionSettings {
    SessionSettings {
        brightness: 0.1,
        timings: RenderTimings {
            steady_tick: Duration::from_millis(5),
            scroll_step: Duration::from_millis(2),
            scroll_idle: Duration::from_millis(5),
        },
        listen_poll: Duration::from_millis(10),
    }
}

fn backoff() -> ReconnectState {
    ReconnectState::new(ReconnectConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_attempts: None,
    })
}

/// Start and connect a session; returns it with the hub and display handles.
fn connected_session() -> (Session, Arc<LocalHub>, Arc<Mutex<MockDisplay>>) {
    let hub = Arc::new(LocalHub::new("strip-01"));
    let display = Arc::new(Mutex::new(MockDisplay::new()));
    let mut session =
        DeviceSession::start(Arc::clone(&hub), Arc::clone(&display), settings()).unwrap();
    session.connect(&mut backoff()).unwrap();
    (session, hub, display)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn patch(value: Value) -> PropertyMap {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

// ── Connect sequence ──

#[test]
fn connect_reports_initial_state() {
    let (session, hub, _display) = connected_session();

    let first = hub.reported().into_iter().next().unwrap();
    assert_eq!(first.len(), LED_COUNT * 5);
    assert_eq!(first["led1_status"], json!(false));
    // Connecting indicator leaves every LED blue with status off.
    assert_eq!(first["led8_r"], json!(0));
    assert_eq!(first["led8_g"], json!(0));
    assert_eq!(first["led8_b"], json!(255));

    session.shutdown();
}

#[test]
fn connect_survives_initial_failures() {
    let hub = Arc::new(LocalHub::new("strip-01"));
    hub.fail_connect_attempts(3);
    let mut session = DeviceSession::start(
        Arc::clone(&hub),
        Arc::new(Mutex::new(MockDisplay::new())),
        settings(),
    )
    .unwrap();

    let mut state = backoff();
    session.connect(&mut state).unwrap();

    assert!(hub.is_connected());
    assert_eq!(state.consecutive_failures(), 0);
    session.shutdown();
}

// ── Direct methods ──

#[test]
fn scroll_then_turn_off_via_hub() {
    let (session, hub, display) = connected_session();

    let id = hub.invoke_method("ScrollLeds", Value::Null);
    let resp = hub.wait_for_response(&id, WAIT).expect("ScrollLeds answered");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.payload["data"], json!("Leds are now scrolling"));
    assert!(session.registry().read(LedRegistry::is_scrolling));

    // The scroll loop sweeps a single white pixel.
    assert!(wait_until(|| {
        display.lock().unwrap().frames.iter().any(|f| {
            f.iter().filter(|p| p.is_some()).count() == 1 && f.contains(&Some(Rgb::WHITE))
        })
    }));

    let id = hub.invoke_method("TurnLedsOff", Value::Null);
    let resp = hub.wait_for_response(&id, WAIT).expect("TurnLedsOff answered");
    assert_eq!(resp.payload, json!({"result": true, "data": "Leds are all off"}));

    let snap = session.registry().snapshot();
    assert!(!snap.is_scrolling());
    assert!(snap.leds().iter().all(|l| !l.status));

    let reported = hub.last_reported().unwrap();
    assert!(reported.iter().filter(|(k, _)| k.ends_with("_status")).all(|(_, v)| v == &json!(false)));
    session.shutdown();
}

#[test]
fn unknown_method_answers_success() {
    let (session, hub, _display) = connected_session();
    let before = session.registry().snapshot();

    let id = hub.invoke_method("SelfDestruct", json!({"now": true}));
    let resp = hub.wait_for_response(&id, WAIT).unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.payload["data"], json!("unknown method"));
    assert_eq!(session.registry().snapshot(), before);
    session.shutdown();
}

// ── Desired properties ──

#[test]
fn desired_patch_lights_led_and_reports() {
    let (session, hub, display) = connected_session();
    let reports_before = hub.reported().len();

    hub.push_desired_patch(patch(json!({
        "$version": 4,
        "led3_status": true,
        "led3_r": 10,
        "led3_g": 20,
        "led3_b": 30,
    })));

    assert!(wait_until(|| session.registry().read(|r| r.led(2).status)));
    assert_eq!(session.registry().read(|r| r.led(2).color), Rgb::new(10, 20, 30));

    assert!(wait_until(|| hub.reported().len() > reports_before));
    let reported = hub.last_reported().unwrap();
    assert_eq!(reported["led3_status"], json!(true));
    assert_eq!(reported["led3_g"], json!(20));
    assert!(!reported.contains_key("$version"));

    assert!(wait_until(|| {
        display
            .lock()
            .unwrap()
            .last_frame()
            .is_some_and(|f| f[2] == Some(Rgb::new(10, 20, 30)))
    }));
    session.shutdown();
}

#[test]
fn partial_patch_touches_one_channel() {
    let (session, hub, _display) = connected_session();
    let before = session.registry().snapshot();

    hub.push_desired_patch(patch(json!({"led3_r": 10})));
    assert!(wait_until(|| session.registry().read(|r| r.led(2).color.r == 10)));

    let after = session.registry().snapshot();
    for i in 0..LED_COUNT {
        if i != 2 {
            assert_eq!(after.led(i), before.led(i));
        }
    }
    let led = after.led(2);
    assert_eq!((led.color.g, led.color.b), (before.led(2).color.g, before.led(2).color.b));
    assert_eq!(led.status, before.led(2).status);
    session.shutdown();
}

#[test]
fn reported_state_rebuilds_registry() {
    let mut source = LedRegistry::new();
    source.set_led(0, true, Rgb::RED, true);
    source.set_led(5, false, Rgb::new(1, 2, 3), true);

    let mut target = LedRegistry::new();
    let outcome = twin::apply_patch(&mut target, &twin::reported_properties(&source));

    assert!(outcome.rejected.is_empty());
    assert_eq!(target.leds(), source.leds());
}

// ── Telemetry ──

#[test]
fn telemetry_batch_marks_leds_green() {
    let (session, hub, _display) = connected_session();
    let mut sim = SensorSimulator::new(StdRng::seed_from_u64(42));

    let sent = telemetry::send_test_batch(
        session.hub(),
        session.registry(),
        &mut sim,
        LED_COUNT + 2,
        Duration::from_millis(1),
        session.token(),
    );

    assert_eq!(sent, LED_COUNT + 2);
    assert_eq!(hub.telemetry().len(), LED_COUNT + 2);
    let snap = session.registry().snapshot();
    assert!(snap.leds().iter().all(|l| l.status && l.blink && l.color == Rgb::GREEN));
    session.shutdown();
}

// ── Shutdown ──

#[test]
fn shutdown_blanks_display_and_disconnects() {
    let (session, hub, display) = connected_session();
    session.registry().update(|r| r.set_led(7, true, Rgb::BLUE, false));
    assert!(wait_until(|| {
        display
            .lock()
            .unwrap()
            .last_frame()
            .is_some_and(|f| f[7] == Some(Rgb::BLUE))
    }));

    let start = Instant::now();
    session.shutdown();

    assert!(start.elapsed() < WAIT);
    assert!(!hub.is_connected());
    assert_eq!(*display.lock().unwrap().last_frame().unwrap(), [None; LED_COUNT]);
}
