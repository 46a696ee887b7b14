//! Fixtures and fakes for unit tests inside this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::caps::{BuyerCaps, CapReservation};
use crate::domain::buyer::{Buyer, BuyerId, EndpointType};
use crate::domain::campaign::CampaignId;
use crate::domain::number::TrackingNumber;
use crate::domain::offer::{Offer, OfferId, PricingModel};
use crate::domain::ActivityStatus;
use crate::routing::{tier_order, RoutingCandidate};
use crate::store::{CandidatePage, CapLedgerStore, OfferCatalog, StoreError};

pub fn buyer(id: &str, tier: i32, weight: i32) -> Buyer {
    Buyer {
        id: BuyerId(id.to_string()),
        name: format!("Buyer {id}"),
        endpoint_type: EndpointType::PhoneNumber,
        endpoint_value: "+15005550006".to_string(),
        concurrency_limit: Some(5),
        tier,
        weight,
        status: ActivityStatus::Active,
        schedule_timezone: None,
        caps: BuyerCaps::default(),
    }
}

pub fn offer(id: &str, buyer_id: &str) -> Offer {
    Offer {
        id: OfferId(id.to_string()),
        campaign_id: CampaignId("camp-1".to_string()),
        buyer_id: BuyerId(buyer_id.to_string()),
        pricing_model: PricingModel::Cpa,
        payout_cents: 10_000,
        buffer_seconds: 60,
        attribution_window_days: Some(30),
        priority: 100,
        weight: 50,
        daily_cap: Some(100),
        is_active: true,
    }
}

pub fn candidate(buyer_id: &str, tier: i32, weight: i32) -> RoutingCandidate {
    RoutingCandidate {
        buyer: buyer(buyer_id, tier, weight),
        offer: offer(&format!("offer-{buyer_id}"), buyer_id),
    }
}

/// Catalog serving a fixed candidate list, optionally after a delay or with an error.
#[derive(Default)]
pub struct FakeCatalog {
    pub candidates: Vec<RoutingCandidate>,
    pub delay: Option<Duration>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn serving(candidates: Vec<RoutingCandidate>) -> Self {
        Self { candidates, ..Self::default() }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OfferCatalog for FakeCatalog {
    async fn find_active_offers(
        &self,
        _campaign_id: &CampaignId,
        page: CandidatePage,
    ) -> Result<Vec<RoutingCandidate>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StoreError::Unavailable("catalog offline".to_string()));
        }
        let mut ordered = self.candidates.clone();
        ordered.sort_by(tier_order);
        Ok(ordered.into_iter().skip(page.offset as usize).take(page.size as usize).collect())
    }

    async fn find_offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, StoreError> {
        Ok(self
            .candidates
            .iter()
            .find(|candidate| &candidate.offer.id == offer_id)
            .map(|candidate| candidate.offer.clone()))
    }

    async fn find_tracking_number(
        &self,
        _e164: &str,
    ) -> Result<Option<TrackingNumber>, StoreError> {
        Ok(None)
    }
}

/// Cap store backed by a mutex-guarded map; records every reservation attempt.
#[derive(Default)]
pub struct FakeCapStore {
    pub caps: Mutex<HashMap<BuyerId, BuyerCaps>>,
    pub attempts: Mutex<Vec<BuyerId>>,
    pub failures: HashMap<BuyerId, StoreError>,
}

impl FakeCapStore {
    pub fn with_caps(entries: Vec<(&str, BuyerCaps)>) -> Self {
        let caps =
            entries.into_iter().map(|(id, caps)| (BuyerId(id.to_string()), caps)).collect();
        Self { caps: Mutex::new(caps), ..Self::default() }
    }

    /// Every reservation for `buyer_id` fails with `error`.
    pub fn failing(mut self, buyer_id: &str, error: StoreError) -> Self {
        self.failures.insert(BuyerId(buyer_id.to_string()), error);
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .map(|attempts| attempts.iter().map(|id| id.0.clone()).collect())
            .unwrap_or_default()
    }

    pub fn used(&self, buyer_id: &str) -> i64 {
        self.caps
            .lock()
            .ok()
            .and_then(|caps| caps.get(&BuyerId(buyer_id.to_string())).map(|c| c.daily_calls_used))
            .unwrap_or(0)
    }
}

#[async_trait]
impl CapLedgerStore for FakeCapStore {
    async fn reserve_buyer_capacity(
        &self,
        buyer_id: &BuyerId,
    ) -> Result<CapReservation, StoreError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(buyer_id.clone());
        }
        if let Some(error) = self.failures.get(buyer_id) {
            return Err(error.clone());
        }
        let mut caps =
            self.caps.lock().map_err(|_| StoreError::Unavailable("poisoned".to_string()))?;
        Ok(caps.entry(buyer_id.clone()).or_default().reserve_call())
    }
}
