use super::*;

fn raw() -> RawSettings {
    RawSettings::default()
}

#[test]
fn defaults_resolve() {
    let settings = Settings::from_raw(raw()).expect("defaults are valid");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.uploads.directory, PathBuf::from("uploads"));
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.ttl, Duration::from_secs(20));
    assert_eq!(settings.cache.key_prefix, "feed_index");
}

#[test]
fn serve_overrides_take_precedence() {
    let mut settings = raw();
    settings.server.port = Some(8080);
    settings.logging.level = Some("debug".to_string());

    let overrides = ServeOverrides {
        server_port: Some(9090),
        log_level: Some("warn".to_string()),
        log_json: Some(true),
        cache_ttl_seconds: Some(5),
        ..Default::default()
    };
    settings.apply_serve_overrides(&overrides);

    let built = Settings::from_raw(settings).expect("valid settings");
    assert_eq!(built.server.addr.port(), 9090);
    assert_eq!(built.logging.level, LevelFilter::WARN);
    assert!(matches!(built.logging.format, LogFormat::Json));
    assert_eq!(built.cache.ttl, Duration::from_secs(5));
}

#[test]
fn database_override_applies_to_group_commands() {
    let mut settings = raw();
    settings.apply_database_override(&DatabaseOverride {
        database_url: Some("postgres://cortile@localhost/cortile".to_string()),
    });

    let built = Settings::from_raw(settings).expect("valid settings");
    assert_eq!(
        built.database.url.as_deref(),
        Some("postgres://cortile@localhost/cortile")
    );
}

#[test]
fn zero_port_is_rejected() {
    let mut settings = raw();
    settings.server.port = Some(0);

    let err = Settings::from_raw(settings).expect_err("zero port rejected");
    assert!(matches!(err, LoadError::Invalid { key: "server.port", .. }));
}

#[test]
fn unknown_log_level_is_rejected() {
    let mut settings = raw();
    settings.logging.level = Some("chatty".to_string());

    let err = Settings::from_raw(settings).expect_err("bad level rejected");
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn zero_cache_ttl_is_rejected() {
    let mut settings = raw();
    settings.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(settings).expect_err("zero ttl rejected");
    assert!(matches!(
        err,
        LoadError::Invalid { key: "cache.ttl_seconds", .. }
    ));
}

#[test]
fn zero_pool_size_is_rejected() {
    let mut settings = raw();
    settings.database.max_connections = Some(0);

    let err = Settings::from_raw(settings).expect_err("zero pool rejected");
    assert!(matches!(
        err,
        LoadError::Invalid { key: "database.max_connections", .. }
    ));
}
