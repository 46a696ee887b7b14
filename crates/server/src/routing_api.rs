use axum::{extract::State, http::StatusCode, response::IntoResponse, response::Response, Json};
use chrono::{DateTime, Utc};
use dcx_core::{CampaignId, NoRouteReason, RoutingOutcome, RoutingRequest, SupplierId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

const MISSING_FIELDS: &str =
    "Missing required fields: campaign_id, supplier_id, from_number, to_number";

#[derive(Debug, Default, Deserialize)]
pub struct DecideRouteBody {
    pub campaign_id: Option<String>,
    pub supplier_id: Option<String>,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub trace_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NoRouteBody {
    pub reason: NoRouteReason,
}

/// Internal decision endpoint. Reserves capacity exactly like the voice webhook
/// but creates no call session.
pub async fn decide(
    State(state): State<AppState>,
    Json(body): Json<DecideRouteBody>,
) -> Result<Response, ApiError> {
    let trace_id = body
        .trace_id
        .filter(|trace_id| !trace_id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (Some(campaign_id), Some(supplier_id), Some(from_number), Some(to_number)) = (
        required(body.campaign_id),
        required(body.supplier_id),
        required(body.from_number),
        required(body.to_number),
    ) else {
        return Err(ApiError::bad_request(MISSING_FIELDS, &trace_id));
    };

    let request = RoutingRequest {
        campaign_id: CampaignId(campaign_id),
        supplier_id: SupplierId(supplier_id),
        from_number,
        to_number,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
        trace_id,
    };

    let response = match state.engine.decide_route_with_retry(&request).await {
        RoutingOutcome::Routed(decision) => (StatusCode::OK, Json(decision)).into_response(),
        RoutingOutcome::NoRoute(reason) => {
            (StatusCode::OK, Json(NoRouteBody { reason })).into_response()
        }
    };
    Ok(response)
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
