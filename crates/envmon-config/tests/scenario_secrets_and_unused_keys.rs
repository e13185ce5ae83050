//! Scenario: Secret literals refused, unused keys reported.
//!
//! # Invariant under test
//!
//! A leaf string that looks like a credential aborts loading with
//! `CONFIG_SECRET_DETECTED` and never echoes the value. Keys outside a
//! surface's consumed registry are listed in the unused-key report; with
//! `Fail` they are an error.

use envmon_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigSurface, UnusedKeyPolicy,
};

#[test]
fn secret_literal_is_refused_and_redacted() {
    let yaml = r#"
notifications:
  smtp_token: "sk-live-abcdef0123456789"
"#;
    let err = load_layered_yaml_from_strings(&[yaml]).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("CONFIG_SECRET_DETECTED"));
    assert!(msg.contains("/notifications/smtp_token"));
    assert!(!msg.contains("abcdef0123456789"));
}

#[test]
fn env_var_names_are_fine() {
    let yaml = r#"
notifications:
  smtp_token_env: "ENVMON_SMTP_TOKEN"
"#;
    assert!(load_layered_yaml_from_strings(&[yaml]).is_ok());
}

#[test]
fn warn_reports_unused_without_error() {
    let yaml = r#"
daemon:
  bind_addr: "127.0.0.1:9000"
audit:
  hashchain: false
legacy:
  theme: dark
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report =
        report_unused_keys(ConfigSurface::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/audit/hashchain".to_string(), "/legacy/theme".to_string()]
    );
    assert_eq!(report.surface, "DAEMON");
}

#[test]
fn fail_policy_errors_on_unused_keys() {
    let yaml = r#"
daemon:
  bind_addr: "127.0.0.1:9000"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();

    // The CLI does not read the daemon section.
    let err = report_unused_keys(ConfigSurface::Cli, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"));

    let ok = report_unused_keys(ConfigSurface::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap();
    assert!(ok.is_clean());
}
