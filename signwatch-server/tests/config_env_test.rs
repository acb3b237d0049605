// Environment layer of the server configuration. Kept in its own test binary
// so the variables never leak into other configuration tests.

use signwatch_server::config::ServerConfig;
use std::io::Write;

#[test]
fn test_env_overrides_toml_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[http]\nport = 9000\nhost = \"127.0.0.1\"\n\n[detection.defaults]\nconfidence_threshold = 0.3\niou_threshold = 0.45\n"
    )
    .unwrap();

    std::env::set_var("SIGNWATCH__HTTP__PORT", "9100");
    std::env::set_var("SIGNWATCH__DETECTION__DEFAULTS__CONFIDENCE_THRESHOLD", "0.65");

    let loaded = ServerConfig::load(Some(file.path()));

    std::env::remove_var("SIGNWATCH__HTTP__PORT");
    std::env::remove_var("SIGNWATCH__DETECTION__DEFAULTS__CONFIDENCE_THRESHOLD");

    let config = loaded.unwrap();
    assert_eq!(config.http.port, 9100);
    assert_eq!(config.http.host, "127.0.0.1");
    assert!((config.detection.defaults.confidence_threshold - 0.65).abs() < 1e-6);
    assert!((config.detection.defaults.iou_threshold - 0.45).abs() < 1e-6);
    assert!(config.validate().is_ok());
}
