use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::buyer::BuyerId;
use crate::domain::call::{CallSessionId, PublicCallId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionEventId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionSource {
    BuyerWebhook,
}

impl ConversionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyerWebhook => "BUYER_WEBHOOK",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BUYER_WEBHOOK" => Some(Self::BuyerWebhook),
            _ => None,
        }
    }
}

/// Append-only record of a buyer-reported outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub id: ConversionEventId,
    pub call_session_id: CallSessionId,
    pub buyer_id: BuyerId,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub revenue_cents: Option<i64>,
    pub source: ConversionSource,
    pub created_at: DateTime<Utc>,
}

/// Inbound conversion as reported by a buyer, keyed by the public call id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionReport {
    pub call_public_id: PublicCallId,
    pub buyer_id: BuyerId,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub revenue_cents: Option<i64>,
    pub source: ConversionSource,
}

#[cfg(test)]
mod tests {
    use super::ConversionSource;

    #[test]
    fn only_known_sources_parse() {
        let source = ConversionSource::BuyerWebhook;
        assert_eq!(ConversionSource::parse(source.as_str()), Some(source));
        assert_eq!(ConversionSource::parse("MANUAL"), None);
        assert_eq!(ConversionSource::parse("buyer_webhook"), None);
    }
}
