//! End-to-end scenarios that cross the codec/protocol/session boundary:
//! bytes in, session state and host events out.

use remote_device_session::{HostEvent, Phase, Session};

use remote_device_session::protocol::{decode, encode_ping, IncomingFrame, SessionStartError};

fn frame_payload(frame: &[u8]) -> &[u8] {
    &frame[5..]
}

fn opcode_of(frame: &[u8]) -> u8 {
    frame[4]
}

fn started_session(min_wait_time_s: u32, allow_until_epoch: u64, now: u64) -> Session {
    use remote_device_session::protocol::SessionBootstrap;

    let mut s = Session::new();
    s.begin_authenticating();
    s.on_login_ok(3, 1, "user-tok".into());
    s.on_tcp_connected(now);
    s.on_frame(
        IncomingFrame::SessionStarted(SessionBootstrap {
            device_id: 7,
            method_name: "VirtualHere".into(),
            device_name: "board-a".into(),
            device_token: "dev-tok".into(),
            min_wait_time_s,
            allow_until_epoch,
            pins: vec![],
        }),
        now,
    );
    s
}

// S1: PING sent on the wire, PONG decoded back into a live latency sample.
#[test]
fn s1_ping_pong_round_trip_updates_latency() {
    let mut session = started_session(30, 1_700_001_000, 1_700_000_000);

    let ping = encode_ping(1_700_000_000_000);
    assert_eq!(opcode_of(&ping), remote_device_session::protocol::OP_PING_OR_PONG);

    let decoded = decode(opcode_of(&ping), frame_payload(&ping)).unwrap();
    assert_eq!(decoded, IncomingFrame::Pong { timestamp_ms: 1_700_000_000_000 });

    let events = session.on_frame(decoded, 1_700_000_000);
    assert!(events.is_empty(), "a single on-time pong raises no warning");
    assert_eq!(session.latency_ms, 0);
}

// S2: START_SESSION carrying two pins of different directions advertises
// both into the catalog and each can be mapped independently.
#[test]
fn s2_session_started_with_two_pins_populates_catalog() {
    use remote_device_session::pins::PinType;
    use remote_device_session::protocol::SessionBootstrap;

    let mut session = Session::new();
    let events = session.on_frame(
        IncomingFrame::SessionStarted(SessionBootstrap {
            device_id: 1,
            method_name: "VirtualHere".into(),
            device_name: "board-a".into(),
            device_token: "tok".into(),
            min_wait_time_s: 30,
            allow_until_epoch: 1_700_001_000,
            pins: vec![
                remote_device_session::pins::Pin::new(1, "D0", PinType::Input),
                remote_device_session::pins::Pin::new(2, "D1", PinType::Output),
            ],
        }),
        1_700_000_000,
    );

    assert_eq!(session.phase, Phase::Active);
    assert!(events.contains(&HostEvent::SessionEstablished));
    assert!(session.map_pin("D0", PinType::Input).is_ok());
    assert!(session.map_pin("D1", PinType::Output).is_ok());
    assert_eq!(session.pins.mapped_count(), 2);
}

// S3: a NotEnoughDevices rejection defers teardown until the host decides,
// then QUEUE_INFO samples drive the queue state, then a late START_SESSION
// still lands the session in Active.
#[test]
fn s3_not_enough_devices_then_queue_then_session_starts() {
    let mut session = Session::new();
    session.begin_authenticating();
    session.on_login_ok(3, 1, "tok".into());
    session.on_tcp_connected(1_700_000_000);

    let events = session.on_frame(
        IncomingFrame::SessionRejected(SessionStartError::NoDevicesAvailable("pool full".into())),
        1_700_000_000,
    );
    assert!(matches!(events[0], HostEvent::NeedQueueDecision { .. }));
    // Socket must stay usable: no phase change, no disconnect, yet.
    assert_eq!(session.phase, Phase::WaitSessionStart);

    session.user_accepts_queue(1_700_000_000);
    assert_eq!(session.phase, Phase::Queued);

    session.on_frame(
        IncomingFrame::QueueInfo {
            user_token: "tok".into(),
            total_users: 4,
            position: 2,
            device_allowed_time_s: 30,
            estimated_epoch: 1_700_000_500,
        },
        1_700_000_100,
    );
    assert_eq!(session.queue.position, 2);

    let events = session.on_frame(
        IncomingFrame::SessionStarted(remote_device_session::protocol::SessionBootstrap {
            device_id: 9,
            method_name: "VirtualHere".into(),
            device_name: "board-b".into(),
            device_token: "dev-tok".into(),
            min_wait_time_s: 30,
            allow_until_epoch: 1_700_001_000,
            pins: vec![],
        }),
        1_700_000_500,
    );
    assert_eq!(session.phase, Phase::Active);
    assert!(events.contains(&HostEvent::SessionEstablished));
}

// S4: mapping obeys direction compatibility and the no-duplicate-name rule,
// and a reconnection advertisement with a changed pin resets mappings.
#[test]
fn s4_mapping_rules_and_reconnection_reset() {
    use remote_device_session::pins::PinType;
    use remote_device_session::protocol::SessionBootstrap;

    let mut session = started_session(30, 1_700_001_000, 1_700_000_000);
    let _ = session.on_frame(
        IncomingFrame::SessionStarted(SessionBootstrap {
            device_id: 7,
            method_name: "VirtualHere".into(),
            device_name: "board-a".into(),
            device_token: "tok".into(),
            min_wait_time_s: 30,
            allow_until_epoch: 1_700_001_000,
            pins: vec![remote_device_session::pins::Pin::new(1, "D0", PinType::Input)],
        }),
        1_700_000_000,
    );
    session.map_pin("D0", PinType::Input).unwrap();
    assert_eq!(session.pins.mapped_count(), 1);
    // wrong direction rejected
    assert!(session.map_pin("D0", PinType::Output).is_err());

    // Reconnection advertises a different pin set: mappings must reset.
    let events = session.on_frame(
        IncomingFrame::SessionStarted(SessionBootstrap {
            device_id: 7,
            method_name: "VirtualHere".into(),
            device_name: "board-a".into(),
            device_token: "tok2".into(),
            min_wait_time_s: 30,
            allow_until_epoch: 1_700_002_000,
            pins: vec![remote_device_session::pins::Pin::new(1, "D0", PinType::Output)],
        }),
        1_700_001_500,
    );
    assert!(events.contains(&HostEvent::MappingReset));
    assert_eq!(session.pins.mapped_count(), 0);
}

// S5: only a real input value change produces an UPDATE_INPUT frame; a
// repeated write is suppressed.
#[test]
fn s5_change_only_input_propagation_produces_one_frame() {
    use remote_device_session::pins::PinType;
    use remote_device_session::protocol::{encode_update_input, SessionBootstrap};

    let mut session = started_session(30, 1_700_001_000, 1_700_000_000);
    session.on_frame(
        IncomingFrame::SessionStarted(SessionBootstrap {
            device_id: 7,
            method_name: "m".into(),
            device_name: "d".into(),
            device_token: "t".into(),
            min_wait_time_s: 30,
            allow_until_epoch: 1_700_001_000,
            pins: vec![remote_device_session::pins::Pin::new(5, "IN0", PinType::Input)],
        }),
        1_700_000_000,
    );
    session.map_pin("IN0", PinType::Input).unwrap();

    let first = session.set_input(5, true);
    assert_eq!(first, Some(true));
    let frame = encode_update_input(5, first.unwrap());
    assert_eq!(opcode_of(&frame), remote_device_session::protocol::OP_UPDATE_INPUT_OR_OUTPUT);

    let second = session.set_input(5, true);
    assert_eq!(second, None, "repeated identical write must not re-send");
}

// S6: a TIME_WARNING with a deadline moves the session into Expiring, and
// once the grace window elapses a tick closes the session.
#[test]
fn s6_time_warning_then_grace_expiry_closes_session() {
    let mut session = started_session(30, 1_700_001_000, 1_700_000_000);
    session.time.alive_since_epoch = Some(1_700_000_995);

    let events = session.on_frame(
        IncomingFrame::TimeWarning {
            after_time_started_epoch: Some(1_700_001_000),
        },
        1_700_001_000,
    );
    assert_eq!(session.phase, Phase::Expiring);
    assert!(events.contains(&HostEvent::SessionStateChanged(Phase::Expiring)));

    // Grace window is 30s; re-arm liveness so the tick exercises only the
    // time-budget check, not the 10s liveness check.
    session.time.alive_since_epoch = Some(1_700_001_030);
    let events = session.on_tick(1_700_001_031);
    assert_eq!(session.phase, Phase::Closed);
    assert!(events.contains(&HostEvent::SessionStateChanged(Phase::Closed)));
}
