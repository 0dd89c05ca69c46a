use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.human_ttl_ms = Some(60_000);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_human_ttl_ms: Some(30_000),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.human_ttl, Duration::from_secs(30));
}

#[test]
fn defaults_match_cache_policy() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.store.backend, StoreBackend::Memory);
    assert_eq!(settings.store.namespace, DEFAULT_STORE_NAMESPACE);
    assert!(settings.cache.enabled);
    assert!(settings.cache.etag);
    assert_eq!(settings.cache.bot_ttl.as_millis(), 172_800_000);
    assert_eq!(settings.cache.human_ttl.as_millis(), 1_200_000);
    assert_eq!(settings.cache.revalidate_ratio, 0.8);
    assert!(settings.cache.bot_agents.iter().any(|agent| agent == "googlebot"));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn redis_backend_uses_configured_url() {
    let mut raw = RawSettings::default();
    raw.store.backend = Some(" Redis ".to_string());
    raw.store.redis_url = Some("redis://cache:6379/2".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.store.backend,
        StoreBackend::Redis {
            url: "redis://cache:6379/2".to_string()
        }
    );
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.store.backend = Some("memcached".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid backend");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "store.backend",
            ..
        }
    ));
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.bot_ttl_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(err.to_string().contains("cache.bot_ttl_ms"));
}

#[test]
fn ratio_outside_unit_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.revalidate_ratio = Some(1.5);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn explicit_agent_list_replaces_defaults() {
    let mut raw = RawSettings::default();
    raw.cache.bot_agents = Some(vec![
        " InternalProbe ".to_string(),
        String::new(),
        "uptime-kuma".to_string(),
    ]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.bot_agents, ["internalprobe", "uptime-kuma"]);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["ssr-cache"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "ssr-cache",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--store-backend",
        "redis",
        "--cache-etag",
        "false",
        "--cache-bot-ttl-ms",
        "5000",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.store_backend.as_deref(), Some("redis"));
            assert_eq!(serve.overrides.cache_etag, Some(false));
            assert_eq!(serve.overrides.cache_bot_ttl_ms, Some(5000));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_check_config() {
    let args = CliArgs::parse_from(["ssr-cache", "check-config"]);
    assert!(matches!(args.command, Some(Command::CheckConfig)));
}
