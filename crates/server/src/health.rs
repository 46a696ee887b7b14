//! Exchange readiness: can this instance take a carrier webhook and route it?

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use dcx_db::{migrations, DbPool, SqlOfferCatalog};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::warn;

use crate::app::TelephonySettings;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    telephony: Arc<TelephonySettings>,
}

/// `Warn` is reported but does not take the instance out of rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ready,
    Warn,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl HealthCheck {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self { name, status, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: Vec<HealthCheck>,
    pub routable_numbers: Option<i64>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, telephony: Arc<TelephonySettings>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, telephony })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = vec![signature_check(&state.telephony)];
    let mut routable_numbers = None;

    match dcx_db::ping(&state.db_pool).await {
        Ok(()) => {
            checks.push(HealthCheck::new("database", CheckStatus::Ready, "database reachable"));
            checks.push(schema_check(&state.db_pool).await);
            let (inventory, count) = inventory_check(&state.db_pool).await;
            checks.push(inventory);
            routable_numbers = count;
        }
        Err(error) => {
            checks.push(HealthCheck::new(
                "database",
                CheckStatus::Degraded,
                format!("database query failed: {error}"),
            ));
            for name in ["schema", "inventory"] {
                checks.push(HealthCheck::new(
                    name,
                    CheckStatus::Degraded,
                    "skipped because the database is unreachable",
                ));
            }
        }
    }

    let degraded: Vec<&str> = checks
        .iter()
        .filter(|check| check.status == CheckStatus::Degraded)
        .map(|check| check.name)
        .collect();
    if !degraded.is_empty() {
        warn!(
            event_name = "system.health.degraded",
            checks = %degraded.join(","),
            "exchange is not ready to take calls"
        );
    }

    let ready = degraded.is_empty();
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        checks,
        routable_numbers,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn signature_check(telephony: &TelephonySettings) -> HealthCheck {
    let name = "webhook_signatures";
    if !telephony.validate_signatures {
        return HealthCheck::new(name, CheckStatus::Warn, "unsigned carrier webhooks accepted");
    }
    if telephony.auth_token.expose_secret().trim().is_empty() {
        return HealthCheck::new(
            name,
            CheckStatus::Degraded,
            "signatures enforced but no carrier auth token is configured",
        );
    }
    HealthCheck::new(name, CheckStatus::Ready, "carrier signatures enforced")
}

async fn schema_check(pool: &DbPool) -> HealthCheck {
    match migrations::pending_versions(pool).await {
        Ok(pending) if pending.is_empty() => {
            HealthCheck::new("schema", CheckStatus::Ready, "all migrations applied")
        }
        Ok(pending) => HealthCheck::new(
            "schema",
            CheckStatus::Degraded,
            format!("pending migrations: {pending:?}; run `dcx migrate`"),
        ),
        Err(error) => HealthCheck::new(
            "schema",
            CheckStatus::Degraded,
            format!("migration ledger unreadable: {error}"),
        ),
    }
}

/// Zero routable numbers is a warning: every inbound call would get the
/// not-configured message, but the webhooks themselves still work.
async fn inventory_check(pool: &DbPool) -> (HealthCheck, Option<i64>) {
    match SqlOfferCatalog::new(pool.clone()).count_routable_numbers().await {
        Ok(0) => (
            HealthCheck::new(
                "inventory",
                CheckStatus::Warn,
                "no active tracking number on an active campaign",
            ),
            Some(0),
        ),
        Ok(count) => (
            HealthCheck::new(
                "inventory",
                CheckStatus::Ready,
                format!("{count} tracking number(s) routable"),
            ),
            Some(count),
        ),
        Err(error) => (
            HealthCheck::new(
                "inventory",
                CheckStatus::Degraded,
                format!("tracking numbers unreadable: {error}"),
            ),
            None,
        ),
    }
}
