//! Carrier voice and status webhooks.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Form,
};
use dcx_core::{handle_inbound_call, CallRoute, CarrierCallId, InboundCall, StatusOutcome};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::app::{AppState, ERROR_MESSAGE, NOT_CONFIGURED_MESSAGE, NO_ROUTE_MESSAGE};
use crate::{signature, twiml};

type CarrierParams = BTreeMap<String, String>;

/// Answers an inbound call with either a `<Dial>` to the routed buyer or a spoken fallback.
pub async fn voice(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<CarrierParams>,
) -> Response {
    if let Err(rejection) = authenticate(&state, &headers, &uri, &params) {
        return rejection;
    }

    let carrier_call_id = param(&params, "CallSid").unwrap_or_default();
    let from_number = param(&params, "From").unwrap_or_default();
    let to_number = param(&params, "To").unwrap_or_default();
    info!(
        event_name = "telephony.voice.received",
        carrier_call_id,
        from_number,
        to_number,
        "inbound call webhook received"
    );

    let voice = state.telephony.voice.as_str();
    if carrier_call_id.is_empty() || to_number.is_empty() {
        warn!(
            event_name = "telephony.voice.incomplete",
            carrier_call_id,
            "voice webhook missing CallSid or To"
        );
        return twiml::into_response(twiml::say(voice, ERROR_MESSAGE));
    }

    let number = match state.lifecycle.resolve_number(to_number).await {
        Ok(Some(number)) => number,
        Ok(None) => {
            info!(
                event_name = "telephony.voice.number_not_configured",
                carrier_call_id,
                to_number,
                "dialed number has no active tracking number"
            );
            return twiml::into_response(twiml::say(voice, NOT_CONFIGURED_MESSAGE));
        }
        Err(error) => {
            warn!(
                event_name = "telephony.voice.lookup_failed",
                carrier_call_id,
                to_number,
                error = %error,
                "tracking number lookup failed"
            );
            return twiml::into_response(twiml::say(voice, ERROR_MESSAGE));
        }
    };

    let call = InboundCall::for_number(
        CarrierCallId(carrier_call_id.to_string()),
        from_number.to_string(),
        &number,
    );
    match handle_inbound_call(&state.lifecycle, &state.engine, call).await {
        CallRoute::Connect(decision) => {
            let callback = status_callback_url(&state, &headers);
            twiml::into_response(twiml::dial(&decision, &callback))
        }
        CallRoute::Fallback(_) => twiml::into_response(twiml::say(voice, NO_ROUTE_MESSAGE)),
    }
}

/// Status callbacks for both the parent call and the bridged buyer leg.
///
/// The bridged leg reports with `ParentCallSid`; dial actions report the final
/// leg outcome through `DialCallStatus` and `DialCallDuration`.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<CarrierParams>,
) -> Response {
    if let Err(rejection) = authenticate(&state, &headers, &uri, &params) {
        return rejection;
    }

    let Some(carrier_call_id) = param(&params, "ParentCallSid").or(param(&params, "CallSid"))
    else {
        warn!(event_name = "telephony.status.missing_call_sid", "status callback without CallSid");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let raw_status = param(&params, "DialCallStatus")
        .or(param(&params, "CallStatus"))
        .unwrap_or("completed");
    let duration_seconds = param(&params, "DialCallDuration")
        .or(param(&params, "CallDuration"))
        .and_then(|value| value.parse::<i64>().ok());

    let carrier_call_id = CarrierCallId(carrier_call_id.to_string());
    let recorded =
        state.lifecycle.record_carrier_status(&carrier_call_id, raw_status, duration_seconds).await;
    match recorded {
        Ok(outcome) => {
            debug!(
                event_name = "telephony.status.recorded",
                carrier_call_id = %carrier_call_id.0,
                raw_status,
                outcome = outcome_label(&outcome),
                "status callback recorded"
            );
            twiml::into_response(twiml::empty())
        }
        Err(error) if error.is_retryable() => {
            warn!(
                event_name = "telephony.status.backend_unavailable",
                carrier_call_id = %carrier_call_id.0,
                raw_status,
                error = %error,
                "status callback could not be recorded"
            );
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(error) => {
            warn!(
                event_name = "telephony.status.rejected",
                carrier_call_id = %carrier_call_id.0,
                raw_status,
                error = %error,
                "status callback rejected"
            );
            twiml::into_response(twiml::empty())
        }
    }
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    params: &CarrierParams,
) -> Result<(), Response> {
    let settings = &state.telephony;
    if !settings.validate_signatures {
        return Ok(());
    }

    let url = signature::request_url(settings.public_base_url.as_deref(), headers, uri);
    let provided = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if signature::verify(settings.auth_token.expose_secret(), &url, params, provided) {
        return Ok(());
    }

    warn!(
        event_name = "telephony.signature.invalid",
        url = %url,
        signature_present = !provided.is_empty(),
        "rejecting carrier webhook with invalid signature"
    );
    Err((StatusCode::FORBIDDEN, "Invalid Twilio signature").into_response())
}

fn status_callback_url(state: &AppState, headers: &HeaderMap) -> String {
    match state.telephony.public_base_url.as_deref() {
        Some(base) => format!("{}/twilio/status", base.trim_end_matches('/')),
        None => format!("{}/twilio/status", signature::origin(headers)),
    }
}

fn param<'a>(params: &'a CarrierParams, key: &str) -> Option<&'a str> {
    params.get(key).map(|value| value.trim()).filter(|value| !value.is_empty())
}

fn outcome_label(outcome: &StatusOutcome) -> &'static str {
    use dcx_core::TerminalOutcome::*;

    match outcome {
        StatusOutcome::Advanced(_) => "advanced",
        StatusOutcome::Ignored => "ignored",
        StatusOutcome::UnknownCall => "unknown_call",
        StatusOutcome::Terminal(Sealed(_)) => "sealed",
        StatusOutcome::Terminal(Duplicate) => "duplicate",
        StatusOutcome::Terminal(Conflict { .. }) => "conflict",
    }
}
