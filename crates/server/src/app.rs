use std::sync::Arc;

use axum::{routing::post, Router};
use dcx_core::config::TelephonyConfig;
use dcx_core::{CallLifecycle, RoutingEngine};
use dcx_db::DbPool;
use secrecy::SecretString;

use crate::{conversions, health, routing_api, telephony};

pub const NOT_CONFIGURED_MESSAGE: &str = "Sorry, this number is not configured yet.";
pub const NO_ROUTE_MESSAGE: &str = "Sorry, we could not connect your call at this time.";
pub const ERROR_MESSAGE: &str = "Sorry, there was an error connecting your call.";

#[derive(Clone)]
pub struct TelephonySettings {
    pub auth_token: SecretString,
    pub validate_signatures: bool,
    pub public_base_url: Option<String>,
    pub voice: String,
}

impl From<&TelephonyConfig> for TelephonySettings {
    fn from(config: &TelephonyConfig) -> Self {
        Self {
            auth_token: config.auth_token.clone(),
            validate_signatures: config.validate_signatures,
            public_base_url: config.public_base_url.clone(),
            voice: config.fallback_voice.clone(),
        }
    }
}

/// Shared handler state. Cloned per request, so everything heavy sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<CallLifecycle>,
    pub engine: Arc<RoutingEngine>,
    pub telephony: Arc<TelephonySettings>,
}

pub fn router(state: AppState, db_pool: DbPool) -> Router {
    let health = health::router(db_pool, state.telephony.clone());
    Router::new()
        .route("/twilio/voice", post(telephony::voice))
        .route("/twilio/status", post(telephony::status))
        .route("/internal/routing/decide", post(routing_api::decide))
        .route("/api/conversions", post(conversions::create))
        .with_state(state)
        .merge(health)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Request, StatusCode},
        Router,
    };
    use dcx_core::{CallLifecycle, RoutingEngine, RoutingPolicy};
    use dcx_db::{
        connect_with_settings, fixtures::seed_memory, migrations, InMemoryExchangeStore,
        SeedResult,
    };
    use tower::ServiceExt;

    use super::{router, AppState, TelephonySettings};
    use crate::signature;

    pub const AUTH_TOKEN: &str = "test-auth-token";
    pub const HOST: &str = "dcx.test";

    pub struct Harness {
        pub router: Router,
        pub store: Arc<InMemoryExchangeStore>,
        pub seed: SeedResult,
        pub lifecycle: Arc<CallLifecycle>,
    }

    pub async fn harness() -> Harness {
        let store = Arc::new(InMemoryExchangeStore::new());
        let seed = seed_memory(&store).await;
        harness_with(store, seed).await
    }

    pub async fn harness_with(store: Arc<InMemoryExchangeStore>, seed: SeedResult) -> Harness {
        let lifecycle = Arc::new(CallLifecycle::new(store.clone(), store.clone()));
        let engine =
            Arc::new(RoutingEngine::new(store.clone(), store.clone(), RoutingPolicy::default()));
        let state = AppState {
            lifecycle: lifecycle.clone(),
            engine,
            telephony: Arc::new(TelephonySettings {
                auth_token: AUTH_TOKEN.to_string().into(),
                validate_signatures: true,
                public_base_url: None,
                voice: "Polly.Matthew".to_string(),
            }),
        };
        let db_pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&db_pool).await.expect("migrations");
        Harness { router: router(state, db_pool), store, seed, lifecycle }
    }

    /// Carrier webhook POST signed with [`AUTH_TOKEN`] unless `signature` overrides it.
    pub fn carrier_request(
        path: &str,
        params: &[(&str, &str)],
        signature: Option<&str>,
    ) -> Request<Body> {
        let params: BTreeMap<String, String> =
            params.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();
        let url = format!("http://{HOST}{path}");
        let computed = signature::sign(AUTH_TOKEN, &url, &params).expect("signature");
        let body = params
            .iter()
            .map(|(key, value)| format!("{}={}", form_encode(key), form_encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        Request::builder()
            .method("POST")
            .uri(path)
            .header("host", HOST)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(signature::SIGNATURE_HEADER, signature.unwrap_or(&computed))
            .body(Body::from(body))
            .expect("request")
    }

    pub fn json_request(path: &str, payload: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf-8 body"))
    }

    fn form_encode(value: &str) -> String {
        let mut encoded = String::with_capacity(value.len());
        for byte in value.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    encoded.push(byte as char)
                }
                other => encoded.push_str(&format!("%{other:02X}")),
            }
        }
        encoded
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};

    use super::test_support::{harness, send};

    #[tokio::test]
    async fn health_is_served_alongside_the_call_routes() {
        let harness = harness().await;
        let request = Request::get("/health").body(axum::body::Body::empty()).expect("request");

        let (status, body) = send(&harness.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ready\""));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let harness = harness().await;
        let request =
            Request::post("/twilio/unknown").body(axum::body::Body::empty()).expect("request");

        let (status, _) = send(&harness.router, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
