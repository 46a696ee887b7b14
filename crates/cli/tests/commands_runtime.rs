use std::env;
use std::sync::{Mutex, OnceLock};

use dcx_cli::commands::route::RouteArgs;
use dcx_cli::commands::{config, doctor, migrate, route, seed};
use serde_json::Value;

const UNSIGNED_LOCAL: (&str, &str) = ("DCX_TELEPHONY_VALIDATE_SIGNATURES", "false");

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[UNSIGNED_LOCAL, ("DCX_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_auth_token() {
    with_env(&[("DCX_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_then_route_preview_and_commit_against_file_database() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("dcx.db").display());

    with_env(&[UNSIGNED_LOCAL, ("DCX_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected seed success: {}", first.output);
        let payload = parse_payload(&first.output);
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("buyer-demo-primary, buyer-demo-overflow")));

        let again = seed::run();
        assert_eq!(again.exit_code, 0, "seeding twice must stay idempotent");

        let preview = route::run(route_args(false));
        let payload = parse_payload(&preview.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("preview: would route to buyer buyer-demo-primary"));

        let committed = route::run(route_args(true));
        let payload = parse_payload(&committed.output);
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("routed to buyer buyer-demo-primary"), "got {message}");
    });
}

#[test]
fn route_commit_on_empty_database_reports_no_active_offers() {
    with_env(&[UNSIGNED_LOCAL, ("DCX_DATABASE_URL", "sqlite::memory:")], || {
        let result = route::run(route_args(true));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "no route: no_active_offers");
    });
}

#[test]
fn config_redacts_auth_token_and_attributes_env_sources() {
    with_env(
        &[
            ("TWILIO_AUTH_TOKEN", "ac-super-secret-token"),
            ("DCX_ROUTING_CANDIDATE_PAGE_SIZE", "7"),
        ],
        || {
            let output = config::run();

            assert!(!output.contains("super-secret"));
            assert!(output
                .contains("- telephony.auth_token = ac*** (source: env (TWILIO_AUTH_TOKEN))"));
            assert!(output.contains(
                "- routing.candidate_page_size = 7 \
                 (source: env (DCX_ROUTING_CANDIDATE_PAGE_SIZE))"
            ));
            assert!(output.contains("- server.port = 4000 (source: default)"));
        },
    );
}

#[test]
fn doctor_reports_readiness_as_json() {
    with_env(&[UNSIGNED_LOCAL, ("DCX_DATABASE_URL", "sqlite::memory:")], || {
        let report: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor output should be JSON");

        assert_eq!(report["overall_status"], "pass");
        let names: Vec<&str> = report["checks"]
            .as_array()
            .map(|checks| checks.iter().filter_map(|check| check["name"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(names, ["config_validation", "signature_readiness", "database_connectivity"]);
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let output = doctor::run(false);

        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation"));
        assert!(output.contains("- [skip] database_connectivity"));
    });
}

fn route_args(commit: bool) -> RouteArgs {
    RouteArgs {
        campaign: "camp-demo-auto".to_string(),
        supplier: "sup-demo".to_string(),
        from: "+14155550123".to_string(),
        to: "+18005550100".to_string(),
        commit,
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "DCX_DATABASE_URL",
        "DCX_DATABASE_MAX_CONNECTIONS",
        "DCX_DATABASE_TIMEOUT_SECS",
        "DCX_SERVER_BIND_ADDRESS",
        "DCX_SERVER_PORT",
        "DCX_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "DCX_TELEPHONY_AUTH_TOKEN",
        "TWILIO_AUTH_TOKEN",
        "DCX_TELEPHONY_VALIDATE_SIGNATURES",
        "DCX_TELEPHONY_COST_PER_MINUTE_CENTS",
        "DCX_TELEPHONY_PUBLIC_BASE_URL",
        "DCX_TELEPHONY_FALLBACK_VOICE",
        "DCX_ROUTING_MAX_RING_SECONDS",
        "DCX_ROUTING_MAX_CALL_DURATION_SECONDS",
        "DCX_ROUTING_BACKEND_TIMEOUT_MS",
        "DCX_ROUTING_CANDIDATE_PAGE_SIZE",
        "DCX_LOGGING_LEVEL",
        "DCX_LOGGING_FORMAT",
        "DCX_LOG_LEVEL",
        "DCX_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
