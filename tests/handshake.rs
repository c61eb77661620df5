use std::thread;
use std::time::{Duration, Instant};

use ardecoder_lib::serial::scripted::{ScriptedConnector, Step};
use ardecoder_lib::{EncoderConfig, EncoderSession, SessionState, SessionStatus};

fn config() -> EncoderConfig {
    EncoderConfig { initial_timeout_ms: 20, ..EncoderConfig::new("/dev/ttyACM0") }
}

fn wait_until(session: &EncoderSession, what: impl Fn(&SessionStatus) -> bool) -> SessionStatus {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = session.status();
        if what(&status) {
            return status;
        }
        assert!(Instant::now() < deadline, "gave up waiting, last status {:?}", status);
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_first_comment_enables_streaming_once() {
    let (connector, handle) = ScriptedConnector::new(vec![
        Step::line("# ardecoder v1"),
        Step::line("# channel 0 ready"),
        Step::line("#"),
    ]);
    let (mut session, mut values) = EncoderSession::start(connector, &config()).unwrap();

    wait_until(&session, |s| s.comments == 3);
    let status = session.stop();

    assert_eq!(handle.writes(), vec!["S100\n".to_string(), "1\n".to_string()]);
    assert_eq!(status.frames_delivered, 0);
    assert!(values.try_take().is_none());
}

#[test]
fn test_rate_follows_config() {
    let (connector, handle) = ScriptedConnector::new(vec![Step::line("#ready")]);
    let config = EncoderConfig { push_interval_ms: 250, ..config() };
    let (mut session, _values) = EncoderSession::start(connector, &config).unwrap();

    wait_until(&session, |s| s.state == SessionState::Streaming);
    session.stop();

    assert_eq!(handle.writes(), vec!["S250\n".to_string(), "1\n".to_string()]);
}

#[test]
fn test_device_errors_leave_state_alone() {
    let (connector, handle) = ScriptedConnector::new(vec![Step::line("?not ready yet")]);
    let (mut session, mut values) = EncoderSession::start(connector, &config()).unwrap();

    let status = wait_until(&session, |s| s.device_errors == 1);
    assert_eq!(status.state, SessionState::Handshaking);
    assert!(handle.writes().is_empty());

    handle.push(Step::line("#ready"));
    wait_until(&session, |s| s.state == SessionState::Streaming);

    handle.push(Step::line("?overflow"));
    let status = wait_until(&session, |s| s.device_errors == 2);
    assert_eq!(status.state, SessionState::Streaming);

    handle.push(Step::line("0 33 1"));
    wait_until(&session, |s| s.frames_delivered == 1);
    assert_eq!(values.try_take().map(|d| d.value), Some(33));

    let status = session.stop();
    assert_eq!(status.state, SessionState::Closed);
    assert!(status.last_error.is_none());
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_noise_is_counted_but_harmless() {
    let (connector, handle) = ScriptedConnector::new(vec![
        Step::line("#ready"),
        Step::line(""),
        Step::text("0 1 1 1\r\n"),
        Step::line("\u{fffd}\u{fffd}"),
        Step::Bytes(vec![0xff, 0xfe, b'\n'].into()),
        Step::line("0 12 0"),
    ]);
    let (mut session, mut values) = EncoderSession::start(connector, &config()).unwrap();

    let status = wait_until(&session, |s| s.frames_delivered == 1);
    assert_eq!(status.malformed_lines, 4);
    assert_eq!(status.state, SessionState::Streaming);
    assert_eq!(values.try_take().map(|d| d.value), Some(12));

    session.stop();
    assert_eq!(handle.close_count(), 1);
}
