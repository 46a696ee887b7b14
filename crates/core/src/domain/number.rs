use serde::{Deserialize, Serialize};

use crate::domain::campaign::{CampaignId, SupplierId};
use crate::domain::ActivityStatus;

/// A published inbound number (DID) and the campaign/supplier it bills to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingNumber {
    pub e164: String,
    pub campaign_id: CampaignId,
    pub supplier_id: SupplierId,
    pub status: ActivityStatus,
}
