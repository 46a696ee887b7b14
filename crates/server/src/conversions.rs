use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use dcx_core::{
    BuyerId, ConversionOutcome, ConversionReport, ConversionSource, InterfaceError, PublicCallId,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

const MISSING_FIELDS: &str = "call_public_id, buyer_id, event_type, and event_time are required";

#[derive(Debug, Default, Deserialize)]
pub struct ConversionBody {
    pub call_public_id: Option<String>,
    pub buyer_id: Option<String>,
    pub event_type: Option<String>,
    pub event_time: Option<String>,
    pub revenue_cents: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConversionAccepted {
    pub id: String,
    pub call_session_id: String,
    pub status: &'static str,
    pub revenue_estimated_cents: i64,
}

/// Buyer-reported conversion for a previously routed call.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<ConversionBody>,
) -> Result<(StatusCode, Json<ConversionAccepted>), ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let report = parse_report(body, &correlation_id)?;

    let outcome = state
        .lifecycle
        .apply_conversion(report.clone())
        .await
        .map_err(|error| ApiError(error.into_interface(correlation_id.as_str())))?;

    match outcome {
        ConversionOutcome::Accepted { event_id, call_session_id, revenue_estimated_cents } => {
            info!(
                event_name = "api.conversion.accepted",
                correlation_id = %correlation_id,
                conversion_event_id = %event_id.0,
                call_session_id = %call_session_id.0,
                "conversion accepted"
            );
            Ok((
                StatusCode::CREATED,
                Json(ConversionAccepted {
                    id: event_id.0,
                    call_session_id: call_session_id.0,
                    status: "ACCEPTED",
                    revenue_estimated_cents,
                }),
            ))
        }
        ConversionOutcome::Rejected(rejection) => {
            info!(
                event_name = "api.conversion.rejected",
                correlation_id = %correlation_id,
                reason = rejection.as_str(),
                "conversion rejected"
            );
            Err(ApiError(rejection.into_error(&report).into_interface(correlation_id)))
        }
    }
}

fn parse_report(body: ConversionBody, correlation_id: &str) -> Result<ConversionReport, ApiError> {
    let (Some(call_public_id), Some(buyer_id), Some(event_type), Some(event_time)) = (
        required(body.call_public_id),
        required(body.buyer_id),
        required(body.event_type),
        required(body.event_time),
    ) else {
        return Err(ApiError::bad_request(MISSING_FIELDS, correlation_id));
    };

    let event_time = DateTime::parse_from_rfc3339(&event_time)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| {
            ApiError(InterfaceError::BadRequest {
                message: format!("event_time `{event_time}` is not an RFC 3339 timestamp"),
                correlation_id: correlation_id.to_string(),
            })
        })?;

    Ok(ConversionReport {
        call_public_id: PublicCallId(call_public_id),
        buyer_id: BuyerId(buyer_id),
        event_type,
        event_time,
        revenue_cents: body.revenue_cents,
        source: ConversionSource::BuyerWebhook,
    })
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
