use serde::{Deserialize, Serialize};

use crate::domain::ActivityStatus;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CampaignId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SupplierId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub vertical: String,
    pub supplier_id: SupplierId,
    pub status: ActivityStatus,
}

impl Campaign {
    pub fn is_routable(&self) -> bool {
        self.status.is_active()
    }
}
