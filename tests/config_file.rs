use std::io::Write;

use ardecoder_lib::config::ConfigError;
use ardecoder_lib::EncoderConfig;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "device = \"COM4\"\npulses_per_revolution = 1024\ninverted = true").unwrap();

    let config = EncoderConfig::load(file.path()).unwrap();
    assert_eq!(config.device, "COM4");
    assert_eq!(config.pulses_per_revolution, 1024);
    assert_eq!(config.revolutions(512), -0.5);
    assert_eq!(config.push_interval_ms, 100);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EncoderConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_bad_toml_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "device = ").unwrap();
    assert!(matches!(EncoderConfig::load(file.path()), Err(ConfigError::Parse(_))));
}
