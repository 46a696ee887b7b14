pub mod engine;
pub mod tiers;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::domain::buyer::{Buyer, BuyerId, EndpointType};
use crate::domain::campaign::{CampaignId, SupplierId};
use crate::domain::offer::{Offer, OfferId};

pub use engine::RoutingEngine;
pub use tiers::{select_tiers, tier_order, Tier};

/// One eligible (buyer, offer) pair for a campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingCandidate {
    pub buyer: Buyer,
    pub offer: Offer,
}

impl RoutingCandidate {
    pub fn is_eligible(&self) -> bool {
        self.offer.is_active && self.buyer.is_active() && self.offer.buyer_id == self.buyer.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationType {
    PhoneNumber,
    Sip,
}

impl DestinationType {
    /// `SIP` endpoints dial as SIP; every other endpoint type dials as a number.
    pub fn for_endpoint(endpoint_type: &EndpointType) -> Self {
        match endpoint_type {
            EndpointType::Sip => Self::Sip,
            EndpointType::PhoneNumber | EndpointType::Other(_) => Self::PhoneNumber,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::Sip => "SIP",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub campaign_id: CampaignId,
    pub supplier_id: SupplierId,
    pub from_number: String,
    pub to_number: String,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub buyer_id: BuyerId,
    pub offer_id: OfferId,
    pub destination_type: DestinationType,
    pub destination_value: String,
    pub max_ring_seconds: u32,
    pub max_call_duration_seconds: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoRouteReason {
    /// The campaign has nothing to sell right now. A business outcome, not a fault.
    NoActiveOffers,
    /// Every tiered candidate failed cap reservation.
    AllBuyersExhausted,
    /// A datastore round-trip failed or timed out.
    BackendUnavailable,
}

impl NoRouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoActiveOffers => "no_active_offers",
            Self::AllBuyersExhausted => "all_buyers_exhausted",
            Self::BackendUnavailable => "backend_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingOutcome {
    Routed(RoutingDecision),
    NoRoute(NoRouteReason),
}

impl RoutingOutcome {
    pub fn decision(&self) -> Option<&RoutingDecision> {
        match self {
            Self::Routed(decision) => Some(decision),
            Self::NoRoute(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub max_ring_seconds: u32,
    pub max_call_duration_seconds: u32,
    /// Upper bound on each datastore round-trip made while deciding.
    pub backend_timeout: Duration,
    /// Candidates fetched per catalog round-trip. Routing keeps paging until a buyer
    /// reserves or the list ends.
    pub candidate_page_size: u32,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            max_ring_seconds: 30,
            max_call_duration_seconds: 1800,
            backend_timeout: Duration::from_millis(250),
            candidate_page_size: 20,
        }
    }
}

impl From<&RoutingConfig> for RoutingPolicy {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            max_ring_seconds: config.max_ring_seconds,
            max_call_duration_seconds: config.max_call_duration_seconds,
            backend_timeout: Duration::from_millis(config.backend_timeout_ms),
            candidate_page_size: config.candidate_page_size,
        }
    }
}
