use chaindns_domain::config::{LogFormat, PluginConfig, PodMode};
use chaindns_domain::{CliOverrides, Config, ConfigError};

const SAMPLE: &str = r#"
[server]
dns_port = 1053
bind_address = "127.0.0.1"

[logging]
level = "debug"
format = "json"

[[plugins]]
type = "rewrite"
rules = ["stop name regex (.*)\\.old\\.org\\. {1}.new.org."]

[[plugins]]
type = "autopath"
search = ["example.org.", "example.com.", ""]

[[plugins]]
type = "kubernetes"
zones = ["cluster.local."]
pods = "verified"
fallthrough = []

[[plugins]]
type = "forward"
upstreams = ["8.8.8.8:53"]
"#;

// ── parsing ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_default_values() {
    let config = Config::default();

    assert_eq!(config.server.dns_port, 53);
    assert_eq!(config.server.bind_address, "0.0.0.0");
    assert_eq!(config.server.udp_workers, 1);
    assert_eq!(config.server.tcp_idle_timeout_secs, 10);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Text);
    assert!(config.plugins.is_empty());
}

#[test]
fn test_config_parses_plugin_chain_in_order() {
    let config = Config::from_toml(SAMPLE).unwrap();

    let names: Vec<&str> = config.plugins.iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["rewrite", "autopath", "kubernetes", "forward"]);
    assert_eq!(config.server.dns_port, 1053);
    assert_eq!(config.logging.format, LogFormat::Json);

    let PluginConfig::Kubernetes(k8s) = &config.plugins[2] else {
        panic!("expected kubernetes plugin");
    };
    assert_eq!(k8s.pods, PodMode::Verified);
    assert_eq!(k8s.ttl, 5);
    assert_eq!(k8s.fallthrough, Some(vec![]));

    assert!(config.validate().is_ok());
}

#[test]
fn test_config_unknown_plugin_is_parse_error() {
    let err = Config::from_toml("[[plugins]]\ntype = \"nope\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_config_cli_overrides_win() {
    let dir = std::env::temp_dir().join(format!("chaindns-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("chaindns.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let config = Config::load(
        path.to_str(),
        CliOverrides {
            dns_port: Some(5353),
            bind_address: None,
            log_level: Some("warn".to_string()),
        },
    )
    .unwrap();

    assert_eq!(config.server.dns_port, 5353);
    assert_eq!(config.server.bind_address, "127.0.0.1");
    assert_eq!(config.logging.level, "warn");
    std::fs::remove_dir_all(&dir).ok();
}

// ── validation ──────────────────────────────────────────────────────────────

#[test]
fn test_validate_rejects_empty_chain() {
    assert!(matches!(
        Config::default().validate(),
        Err(ConfigError::EmptyChain)
    ));
}

#[test]
fn test_validate_rejects_bad_reverse_network() {
    let config = Config::from_toml(
        r#"
[[plugins]]
type = "reverse"
networks = ["10.1.1.0/33"]
hostname = "ip-{ip}.example.org."
"#,
    )
    .unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(
        &err,
        ConfigError::InvalidField { field: "network", value, .. } if value == "10.1.1.0/33"
    ));
    assert_eq!(err.plugin_type(), Some("reverse"));
}

#[test]
fn test_validate_rejects_template_without_placeholder() {
    let config = Config::from_toml(
        r#"
[[plugins]]
type = "reverse"
networks = ["10.1.1.0/24"]
hostname = "host.example.org."
"#,
    )
    .unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_kubernetes_ttl_out_of_range() {
    let config = Config::from_toml(
        r#"
[[plugins]]
type = "kubernetes"
zones = ["cluster.local."]
ttl = 3601
"#,
    )
    .unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidField { plugin: "kubernetes", field: "ttl", .. }));
    assert!(err.to_string().contains("3601"));
}

#[test]
fn test_validate_rejects_bad_upstream() {
    let config = Config::from_toml(
        r#"
[[plugins]]
type = "forward"
upstreams = ["not-an-address"]
"#,
    )
    .unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidField { plugin: "forward", field: "upstream", .. })
    ));
}

#[test]
fn test_validate_rejects_autopath_without_search() {
    let config = Config::from_toml("[[plugins]]\ntype = \"autopath\"\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Plugin { plugin: "autopath", .. }));
    assert_eq!(err.plugin_type(), Some("autopath"));
}

#[test]
fn test_validate_names_plugin_without_zones() {
    let config = Config::from_toml("[[plugins]]\ntype = \"template\"\nzones = []\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::MissingZones { plugin: "template" }));
    assert_eq!(err.to_string(), "template: at least one zone is required");
}

#[test]
fn test_validate_rejects_port_zero() {
    let mut config =
        Config::from_toml("[[plugins]]\ntype = \"forward\"\nupstreams = [\"8.8.8.8:53\"]\n")
            .unwrap();
    config.server.dns_port = 0;
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Server(_)));
    assert_eq!(err.plugin_type(), None);
}

#[test]
fn test_missing_file_reports_path() {
    let err =
        Config::load(Some("/nonexistent/chaindns.toml"), CliOverrides::default()).unwrap_err();
    match err {
        ConfigError::FileRead { path, .. } => assert_eq!(path, "/nonexistent/chaindns.toml"),
        other => panic!("unexpected error {:?}", other),
    }
}
