//! Black-box coverage of configuration precedence: defaults, file, then
//! environment overrides (spec §6).

use std::io::Write;

use chanwatch::config::ChanwatchConfig;

#[test]
fn file_values_override_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp config file");
    write!(
        file,
        r#"
        [tuning]
        n_work = 5
        n_vk = 2
        n_vk_hist = 1
        t_refresh_secs = 30
        cooldown_secs = 120
        summary_len = 80
        http_timeout_secs = 10
        summarizer_timeout_secs = 30
        queue_capacity = 64

        [store]
        connection_string = "sqlite://test.db"
        "#
    )
    .expect("failed to write temp config file");

    let config = ChanwatchConfig::load_from_file(file.path()).expect("config should parse");
    assert_eq!(config.tuning.n_work, 5);
    assert_eq!(config.tuning.cooldown_secs, 120);
    assert_eq!(config.store.connection_string, "sqlite://test.db");
}

#[test]
fn env_overrides_win_over_file_values() {
    let mut config = ChanwatchConfig::load_from_file(std::path::Path::new("/nonexistent.toml"))
        .expect("missing file yields defaults");
    assert_eq!(config.tuning.n_work, 30);

    config.apply_overrides(|key| match key {
        "CHANWATCH_N_WORK" => Some("3".to_string()),
        "TELEGRAM_BOT_TOKEN" => Some("test-token".to_string()),
        _ => None,
    });

    assert_eq!(config.tuning.n_work, 3);
    assert_eq!(config.credentials.telegram_bot_token.as_deref(), Some("test-token"));
}

#[test]
fn malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp config file");
    write!(file, "not = [valid toml").expect("failed to write");
    assert!(ChanwatchConfig::load_from_file(file.path()).is_err());
}
