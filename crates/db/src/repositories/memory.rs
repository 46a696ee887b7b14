use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use dcx_core::caps::CapReservation;
use dcx_core::domain::buyer::{Buyer, BuyerId};
use dcx_core::domain::call::{
    CallSession, CallSessionId, CallStatus, CarrierCallId, NewCallSession, PublicCallId,
    SealedCall,
};
use dcx_core::domain::campaign::{Campaign, CampaignId};
use dcx_core::domain::conversion::ConversionEvent;
use dcx_core::domain::number::TrackingNumber;
use dcx_core::domain::offer::{Offer, OfferId};
use dcx_core::economics::raise_revenue;
use dcx_core::routing::{tier_order, RoutingCandidate};
use dcx_core::store::{
    CallSessionStore, CandidatePage, CapLedgerStore, ConversionWrite, OfferCatalog, SessionUpsert,
    StoreError,
};

#[derive(Default)]
struct ExchangeState {
    campaigns: HashMap<CampaignId, Campaign>,
    buyers: HashMap<BuyerId, Buyer>,
    offers: BTreeMap<OfferId, Offer>,
    numbers: HashMap<String, TrackingNumber>,
    sessions: HashMap<CallSessionId, CallSession>,
    conversions: Vec<ConversionEvent>,
}

impl ExchangeState {
    fn credit_buyer(&mut self, buyer_id: &BuyerId, delta_cents: i64) {
        if let Some(buyer) = self.buyers.get_mut(buyer_id) {
            buyer.caps.credit_revenue(delta_cents);
        }
    }
}

/// Whole exchange behind one lock. Every write happens under the write guard, which
/// gives the same check-and-increment atomicity the SQL store gets from SQLite.
#[derive(Default)]
pub struct InMemoryExchangeStore {
    state: RwLock<ExchangeState>,
}

impl InMemoryExchangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.state.write().await.campaigns.insert(campaign.id.clone(), campaign);
    }

    pub async fn insert_buyer(&self, buyer: Buyer) {
        self.state.write().await.buyers.insert(buyer.id.clone(), buyer);
    }

    pub async fn insert_offer(&self, offer: Offer) {
        self.state.write().await.offers.insert(offer.id.clone(), offer);
    }

    pub async fn insert_tracking_number(&self, number: TrackingNumber) {
        self.state.write().await.numbers.insert(number.e164.clone(), number);
    }

    pub async fn buyer(&self, buyer_id: &BuyerId) -> Option<Buyer> {
        self.state.read().await.buyers.get(buyer_id).cloned()
    }
}

#[async_trait]
impl OfferCatalog for InMemoryExchangeStore {
    async fn find_active_offers(
        &self,
        campaign_id: &CampaignId,
        page: CandidatePage,
    ) -> Result<Vec<RoutingCandidate>, StoreError> {
        let state = self.state.read().await;
        let routable = state.campaigns.get(campaign_id).is_some_and(Campaign::is_routable);
        if !routable {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<RoutingCandidate> = state
            .offers
            .values()
            .filter(|offer| &offer.campaign_id == campaign_id && offer.is_active)
            .filter_map(|offer| {
                let buyer = state.buyers.get(&offer.buyer_id)?;
                buyer.is_active().then(|| RoutingCandidate {
                    buyer: buyer.clone(),
                    offer: offer.clone(),
                })
            })
            .collect();

        candidates.sort_by(tier_order);
        Ok(candidates.into_iter().skip(page.offset as usize).take(page.size as usize).collect())
    }

    async fn find_offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, StoreError> {
        Ok(self.state.read().await.offers.get(offer_id).cloned())
    }

    async fn find_tracking_number(
        &self,
        e164: &str,
    ) -> Result<Option<TrackingNumber>, StoreError> {
        Ok(self.state.read().await.numbers.get(e164).cloned())
    }
}

#[async_trait]
impl CapLedgerStore for InMemoryExchangeStore {
    async fn reserve_buyer_capacity(
        &self,
        buyer_id: &BuyerId,
    ) -> Result<CapReservation, StoreError> {
        let mut state = self.state.write().await;
        let buyer = state
            .buyers
            .get_mut(buyer_id)
            .ok_or_else(|| StoreError::NotFound(format!("buyer `{}`", buyer_id.0)))?;
        Ok(buyer.caps.reserve_call())
    }
}

#[async_trait]
impl CallSessionStore for InMemoryExchangeStore {
    async fn create_or_fetch(&self, session: NewCallSession) -> Result<SessionUpsert, StoreError> {
        let mut state = self.state.write().await;
        let existing = state
            .sessions
            .values()
            .find(|existing| existing.carrier_call_id == session.carrier_call_id)
            .cloned();
        if let Some(existing) = existing {
            return Ok(SessionUpsert { session: existing, created: false });
        }

        let created = CallSession::initiated(session);
        state.sessions.insert(created.id.clone(), created.clone());
        Ok(SessionUpsert { session: created, created: true })
    }

    async fn find_by_id(&self, id: &CallSessionId) -> Result<Option<CallSession>, StoreError> {
        Ok(self.state.read().await.sessions.get(id).cloned())
    }

    async fn find_by_public_id(
        &self,
        public_id: &PublicCallId,
    ) -> Result<Option<CallSession>, StoreError> {
        let state = self.state.read().await;
        Ok(state.sessions.values().find(|session| &session.public_id == public_id).cloned())
    }

    async fn find_by_carrier_call_id(
        &self,
        carrier_call_id: &CarrierCallId,
    ) -> Result<Option<CallSession>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .find(|session| &session.carrier_call_id == carrier_call_id)
            .cloned())
    }

    async fn attach_route(
        &self,
        id: &CallSessionId,
        buyer_id: &BuyerId,
        offer_id: &OfferId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("call session `{}`", id.0)))?;
        session.buyer_id = Some(buyer_id.clone());
        session.offer_id = Some(offer_id.clone());
        Ok(())
    }

    async fn advance_status(
        &self,
        id: &CallSessionId,
        expected: CallStatus,
        next: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(session) = state.sessions.get_mut(id) else {
            return Ok(false);
        };
        if session.status != expected {
            return Ok(false);
        }
        session.status = next;
        if next == CallStatus::InProgress && session.answered_at.is_none() {
            session.answered_at = Some(at);
        }
        Ok(true)
    }

    async fn seal_terminal(
        &self,
        id: &CallSessionId,
        sealed: &SealedCall,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(session) = state.sessions.get_mut(id) else {
            return Ok(false);
        };
        if session.status.is_terminal() {
            return Ok(false);
        }

        let previous = session.revenue_estimated_cents;
        session.status = sealed.status;
        session.ended_at = Some(sealed.ended_at);
        session.duration_seconds = Some(sealed.duration_seconds);
        session.billable_duration_seconds = Some(sealed.billable_duration_seconds);
        session.telephony_cost_cents = Some(sealed.telephony_cost_cents);
        session.revenue_estimated_cents = previous.max(sealed.revenue_estimated_cents);
        let delta = session.revenue_estimated_cents - previous;
        let buyer_id = session.buyer_id.clone();

        if let Some(buyer_id) = buyer_id {
            state.credit_buyer(&buyer_id, delta);
        }
        Ok(true)
    }

    async fn append_conversion(
        &self,
        event: &ConversionEvent,
    ) -> Result<ConversionWrite, StoreError> {
        let mut state = self.state.write().await;
        let session = state.sessions.get_mut(&event.call_session_id).ok_or_else(|| {
            StoreError::NotFound(format!("call session `{}`", event.call_session_id.0))
        })?;

        let previous = session.revenue_estimated_cents;
        session.revenue_estimated_cents = raise_revenue(previous, event.revenue_cents);
        let current = session.revenue_estimated_cents;

        state.credit_buyer(&event.buyer_id, current - previous);
        if let Some(buyer) = state.buyers.get_mut(&event.buyer_id) {
            buyer.caps.monthly_conversion_used += 1;
        }
        state.conversions.push(event.clone());

        Ok(ConversionWrite { revenue_estimated_cents: current, raised: current > previous })
    }

    async fn list_conversions(
        &self,
        id: &CallSessionId,
    ) -> Result<Vec<ConversionEvent>, StoreError> {
        let state = self.state.read().await;
        Ok(state.conversions.iter().filter(|event| &event.call_session_id == id).cloned().collect())
    }
}
