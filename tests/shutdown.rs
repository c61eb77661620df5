use std::thread;
use std::time::{Duration, Instant};

use ardecoder_lib::serial::scripted::ScriptedConnector;
use ardecoder_lib::{EncoderConfig, EncoderSession, SessionState};

#[test]
fn test_stop_while_blocked_in_read() {
    let config = EncoderConfig { initial_timeout_ms: 1000, ..EncoderConfig::new("/dev/ttyACM0") };
    let (connector, handle) = ScriptedConnector::new(vec![]);
    let (mut session, _values) = EncoderSession::start(connector, &config).unwrap();

    while session.status().state != SessionState::Handshaking {
        thread::sleep(Duration::from_millis(1));
    }
    // let the worker settle into its blocking read
    thread::sleep(Duration::from_millis(50));
    assert!(session.is_running());

    let started = Instant::now();
    let status = session.stop();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(1500), "shutdown took {:?}", elapsed);
    assert_eq!(status.state, SessionState::Closed);
    assert!(status.last_error.is_none());
    assert_eq!(handle.close_count(), 1);
    assert!(!session.is_running());
    assert!(handle.read_timeouts().iter().all(|t| *t == Duration::from_millis(1000)));
}

#[test]
fn test_request_stop_then_join() {
    let config = EncoderConfig { initial_timeout_ms: 20, ..EncoderConfig::new("/dev/ttyACM0") };
    let (connector, handle) = ScriptedConnector::new(vec![]);
    let (session, _values) = EncoderSession::start(connector, &config).unwrap();

    session.request_stop();
    let status = session.join();

    assert_eq!(status.state, SessionState::Closed);
    assert_eq!(handle.close_count(), 1);
}
