use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::caps::{CapLedger, CapReservation};
use crate::routing::{
    select_tiers, DestinationType, NoRouteReason, RoutingCandidate, RoutingDecision,
    RoutingOutcome, RoutingPolicy, RoutingRequest,
};
use crate::store::{CandidatePage, CapLedgerStore, OfferCatalog, StoreError};

/// Picks the buyer for an inbound call.
///
/// Tiers are walked in ascending order and candidates inside a tier in selector
/// order; the first candidate whose cap reservation succeeds wins and no further
/// reservations are attempted. The catalog is read one page at a time until a buyer
/// reserves or the candidate list ends, so the page size never hides a buyer.
/// A reservation that succeeds is never refunded, even if the caller has hung up by
/// the time the decision is returned.
pub struct RoutingEngine {
    catalog: Arc<dyn OfferCatalog>,
    ledger: CapLedger,
    policy: RoutingPolicy,
}

impl RoutingEngine {
    pub fn new(
        catalog: Arc<dyn OfferCatalog>,
        cap_store: Arc<dyn CapLedgerStore>,
        policy: RoutingPolicy,
    ) -> Self {
        let ledger = CapLedger::new(cap_store, policy.backend_timeout);
        Self { catalog, ledger, policy }
    }

    pub async fn decide_route(&self, request: &RoutingRequest) -> RoutingOutcome {
        debug!(
            event_name = "routing.request.received",
            trace_id = %request.trace_id,
            campaign_id = %request.campaign_id.0,
            supplier_id = %request.supplier_id.0,
            "routing request received"
        );

        let mut page = CandidatePage::first(self.policy.candidate_page_size);
        let mut fetched = 0usize;
        loop {
            let lookup = self.catalog.find_active_offers(&request.campaign_id, page);
            let candidates = match self.bounded(lookup).await {
                Ok(candidates) => candidates,
                Err(error) => {
                    return self.backend_unavailable(request, "find_active_offers", &error)
                }
            };
            let last_page = page.is_last(candidates.len());
            fetched += candidates.len();

            match self.reserve_first(request, candidates).await {
                Ok(Some(decision)) => return RoutingOutcome::Routed(decision),
                Ok(None) => {}
                Err(error) => {
                    return self.backend_unavailable(request, "reserve_buyer_capacity", &error)
                }
            }

            if last_page {
                break;
            }
            page = page.next();
        }

        if fetched == 0 {
            info!(
                event_name = "routing.no_active_offers",
                trace_id = %request.trace_id,
                campaign_id = %request.campaign_id.0,
                "no active offers for campaign"
            );
            return RoutingOutcome::NoRoute(NoRouteReason::NoActiveOffers);
        }

        info!(
            event_name = "routing.all_buyers_exhausted",
            trace_id = %request.trace_id,
            campaign_id = %request.campaign_id.0,
            candidates = fetched,
            "every candidate failed cap reservation"
        );
        RoutingOutcome::NoRoute(NoRouteReason::AllBuyersExhausted)
    }

    /// Tries one page of candidates in tier order. Only transient store failures
    /// abort the walk; a deterministic failure on one buyer moves on to the next.
    async fn reserve_first(
        &self,
        request: &RoutingRequest,
        candidates: Vec<RoutingCandidate>,
    ) -> Result<Option<RoutingDecision>, StoreError> {
        for tier in select_tiers(candidates) {
            for candidate in &tier.candidates {
                match self.ledger.try_reserve(&candidate.buyer.id).await {
                    Ok(CapReservation::Reserved) => {
                        let decision = self.decision_for(candidate);
                        info!(
                            event_name = "routing.decision.made",
                            trace_id = %request.trace_id,
                            campaign_id = %request.campaign_id.0,
                            buyer_id = %decision.buyer_id.0,
                            offer_id = %decision.offer_id.0,
                            tier = tier.tier,
                            destination_type = decision.destination_type.as_str(),
                            "routing decision made"
                        );
                        return Ok(Some(decision));
                    }
                    Ok(CapReservation::Exhausted(violation)) => {
                        debug!(
                            event_name = "routing.candidate.skipped",
                            trace_id = %request.trace_id,
                            buyer_id = %candidate.buyer.id.0,
                            tier = tier.tier,
                            reason = violation.as_str(),
                            "candidate skipped"
                        );
                    }
                    Err(error) if error.is_transient() => return Err(error),
                    Err(error) => {
                        warn!(
                            event_name = "routing.candidate.reserve_failed",
                            trace_id = %request.trace_id,
                            buyer_id = %candidate.buyer.id.0,
                            tier = tier.tier,
                            error = %error,
                            "candidate reservation failed; trying next candidate"
                        );
                    }
                }
            }
        }
        Ok(None)
    }

    /// Caller-side policy: a `backend_unavailable` outcome is retried once, anything
    /// else is final.
    pub async fn decide_route_with_retry(&self, request: &RoutingRequest) -> RoutingOutcome {
        let outcome = self.decide_route(request).await;
        match outcome {
            RoutingOutcome::NoRoute(reason) if reason.is_retryable() => {
                info!(
                    event_name = "routing.retry",
                    trace_id = %request.trace_id,
                    reason = reason.as_str(),
                    "retrying routing decision once"
                );
                self.decide_route(request).await
            }
            other => other,
        }
    }

    fn decision_for(&self, candidate: &RoutingCandidate) -> RoutingDecision {
        RoutingDecision {
            buyer_id: candidate.buyer.id.clone(),
            offer_id: candidate.offer.id.clone(),
            destination_type: DestinationType::for_endpoint(&candidate.buyer.endpoint_type),
            destination_value: candidate.buyer.endpoint_value.clone(),
            max_ring_seconds: self.policy.max_ring_seconds,
            max_call_duration_seconds: self.policy.max_call_duration_seconds,
        }
    }

    async fn bounded<T, F>(&self, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.policy.backend_timeout, future)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    fn backend_unavailable(
        &self,
        request: &RoutingRequest,
        operation: &'static str,
        error: &StoreError,
    ) -> RoutingOutcome {
        warn!(
            event_name = "routing.backend_unavailable",
            trace_id = %request.trace_id,
            campaign_id = %request.campaign_id.0,
            operation,
            error = %error,
            "routing backend unavailable"
        );
        RoutingOutcome::NoRoute(NoRouteReason::BackendUnavailable)
    }
}
