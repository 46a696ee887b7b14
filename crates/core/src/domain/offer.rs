use serde::{Deserialize, Serialize};

use crate::domain::buyer::BuyerId;
use crate::domain::campaign::CampaignId;
use crate::economics::OfferTerms;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingModel {
    Cpa,
    Cpc,
    Other(String),
}

impl PricingModel {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CPA" => Self::Cpa,
            "CPC" => Self::Cpc,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Cpa => "CPA",
            Self::Cpc => "CPC",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

/// Commercial terms linking one buyer to one campaign.
///
/// `priority` and `weight` are legacy selection hints kept for reporting; routing
/// orders candidates by the buyer's tier and weight instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub campaign_id: CampaignId,
    pub buyer_id: BuyerId,
    pub pricing_model: PricingModel,
    pub payout_cents: i64,
    pub buffer_seconds: i64,
    pub attribution_window_days: Option<i64>,
    pub priority: i32,
    pub weight: i32,
    pub daily_cap: Option<i64>,
    pub is_active: bool,
}

impl Offer {
    pub fn terms(&self) -> OfferTerms {
        OfferTerms { payout_cents: self.payout_cents, buffer_seconds: self.buffer_seconds }
    }
}
