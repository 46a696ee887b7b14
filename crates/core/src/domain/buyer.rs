use serde::{Deserialize, Serialize};

use crate::caps::BuyerCaps;
use crate::domain::ActivityStatus;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuyerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointType {
    PhoneNumber,
    Sip,
    Other(String),
}

impl EndpointType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PHONE_NUMBER" => Self::PhoneNumber,
            "SIP" => Self::Sip,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::Sip => "SIP",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub id: BuyerId,
    pub name: String,
    pub endpoint_type: EndpointType,
    pub endpoint_value: String,
    pub concurrency_limit: Option<u32>,
    /// Lower tiers are tried first.
    pub tier: i32,
    /// Higher weights win inside a tier.
    pub weight: i32,
    pub status: ActivityStatus,
    pub schedule_timezone: Option<String>,
    pub caps: BuyerCaps,
}

impl Buyer {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
