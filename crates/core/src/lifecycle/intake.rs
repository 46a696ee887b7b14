use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::lifecycle::{CallLifecycle, InboundCall};
use crate::routing::{NoRouteReason, RoutingDecision, RoutingEngine, RoutingOutcome, RoutingRequest};

/// What the carrier should do with the live call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallRoute {
    Connect(RoutingDecision),
    /// Play the apology prompt; never tear the call down.
    Fallback(NoRouteReason),
}

/// Opens the session, routes the call, and attaches the route.
///
/// Session persistence failures are logged and routing continues without a session,
/// because a caller already on the line should still reach a buyer.
pub async fn handle_inbound_call(
    lifecycle: &CallLifecycle,
    engine: &RoutingEngine,
    call: InboundCall,
) -> CallRoute {
    let request_base = RoutingRequest {
        campaign_id: call.campaign_id.clone(),
        supplier_id: call.supplier_id.clone(),
        from_number: call.from_number.clone(),
        to_number: call.to_number.clone(),
        timestamp: Utc::now(),
        trace_id: String::new(),
    };
    let carrier_call_id = call.carrier_call_id.clone();

    let session = match lifecycle.open_session(call).await {
        Ok(session) => Some(session),
        Err(error) => {
            warn!(
                event_name = "call_session.create_failed",
                carrier_call_id = %carrier_call_id.0,
                error = %error,
                "could not persist call session; routing without one"
            );
            None
        }
    };

    let trace_id = session
        .as_ref()
        .map_or_else(|| Uuid::new_v4().to_string(), |session| session.trace_id.clone());
    let request = RoutingRequest { trace_id, ..request_base };

    match engine.decide_route_with_retry(&request).await {
        RoutingOutcome::Routed(decision) => {
            if let Some(session) = &session {
                if let Err(error) = lifecycle.attach_route(session, &decision).await {
                    warn!(
                        event_name = "call_session.attach_route_failed",
                        trace_id = %request.trace_id,
                        call_session_id = %session.id.0,
                        error = %error,
                        "route chosen but not recorded on the session"
                    );
                }
            }
            CallRoute::Connect(decision)
        }
        RoutingOutcome::NoRoute(reason) => {
            info!(
                event_name = "call.fallback",
                trace_id = %request.trace_id,
                campaign_id = %request.campaign_id.0,
                reason = reason.as_str(),
                "no route for inbound call; playing fallback"
            );
            CallRoute::Fallback(reason)
        }
    }
}
