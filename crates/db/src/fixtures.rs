//! Seed data for local runs (`dcx seed`) and for repository/lifecycle tests.

use dcx_core::caps::BuyerCaps;
use dcx_core::domain::buyer::{Buyer, BuyerId, EndpointType};
use dcx_core::domain::campaign::{Campaign, CampaignId, SupplierId};
use dcx_core::domain::number::TrackingNumber;
use dcx_core::domain::offer::{Offer, OfferId, PricingModel};
use dcx_core::domain::ActivityStatus;

use crate::connection::DbPool;
use crate::repositories::{InMemoryExchangeStore, RepositoryError};

pub const DEMO_SUPPLIER_ID: &str = "sup-demo";
pub const DEMO_CAMPAIGN_ID: &str = "camp-demo-auto";
pub const DEMO_TRACKING_NUMBER: &str = "+18005550100";

/// Buyer row shape used by tests; caps other than the daily call cap start uncapped.
#[derive(Clone, Debug)]
pub struct BuyerSeed {
    pub id: String,
    pub tier: i32,
    pub weight: i32,
    pub endpoint_type: EndpointType,
    pub endpoint_value: String,
    pub active: bool,
    pub daily_call_cap: Option<i64>,
}

impl BuyerSeed {
    pub fn phone(id: &str, tier: i32, weight: i32) -> Self {
        Self {
            id: id.to_string(),
            tier,
            weight,
            endpoint_type: EndpointType::PhoneNumber,
            endpoint_value: "+15005550006".to_string(),
            active: true,
            daily_call_cap: None,
        }
    }

    pub fn sip(id: &str, tier: i32, weight: i32) -> Self {
        Self {
            endpoint_type: EndpointType::Sip,
            endpoint_value: format!("sip:{id}@sip.example.com"),
            ..Self::phone(id, tier, weight)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub supplier_id: String,
    pub campaign_id: String,
    pub buyer_ids: Vec<String>,
    pub tracking_number: String,
}

pub async fn insert_campaign(
    pool: &DbPool,
    supplier_id: &str,
    campaign_id: &str,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT OR IGNORE INTO supplier (id, name, status) VALUES (?, ?, 'ACTIVE')")
        .bind(supplier_id)
        .bind(format!("Supplier {supplier_id}"))
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO campaign (id, name, vertical, supplier_id, status)
         VALUES (?, ?, ?, ?, 'ACTIVE')",
    )
    .bind(campaign_id)
    .bind(format!("Campaign {campaign_id}"))
    .bind("auto_insurance")
    .bind(supplier_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_buyer(pool: &DbPool, seed: &BuyerSeed) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT OR IGNORE INTO buyer (
            id,
            name,
            endpoint_type,
            endpoint_value,
            tier,
            weight,
            status,
            daily_call_cap
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&seed.id)
    .bind(format!("Buyer {}", seed.id))
    .bind(seed.endpoint_type.as_str())
    .bind(&seed.endpoint_value)
    .bind(seed.tier)
    .bind(seed.weight)
    .bind(if seed.active { "ACTIVE" } else { "INACTIVE" })
    .bind(seed.daily_call_cap)
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts `offer-{buyer_id}` linking the buyer to the campaign.
pub async fn insert_offer(
    pool: &DbPool,
    campaign_id: &str,
    buyer_id: &str,
    payout_cents: i64,
    buffer_seconds: i64,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT OR IGNORE INTO offer (
            id,
            campaign_id,
            buyer_id,
            pricing_model,
            payout_cents,
            buffer_seconds,
            is_active
         ) VALUES (?, ?, ?, 'CPA', ?, ?, 1)",
    )
    .bind(format!("offer-{buyer_id}"))
    .bind(campaign_id)
    .bind(buyer_id)
    .bind(payout_cents)
    .bind(buffer_seconds)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_tracking_number(
    pool: &DbPool,
    e164: &str,
    campaign_id: &str,
    supplier_id: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT OR IGNORE INTO tracking_number (e164, campaign_id, supplier_id, status)
         VALUES (?, ?, ?, 'ACTIVE')",
    )
    .bind(e164)
    .bind(campaign_id)
    .bind(supplier_id)
    .execute(pool)
    .await?;

    Ok(())
}

fn demo_buyer_seeds() -> [BuyerSeed; 2] {
    [
        BuyerSeed { daily_call_cap: Some(100), ..BuyerSeed::phone("buyer-demo-primary", 1, 100) },
        BuyerSeed::sip("buyer-demo-overflow", 2, 50),
    ]
}

/// Idempotent: re-running leaves existing rows untouched.
pub async fn seed_demo(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    insert_campaign(pool, DEMO_SUPPLIER_ID, DEMO_CAMPAIGN_ID).await?;

    let seeds = demo_buyer_seeds();
    for seed in &seeds {
        insert_buyer(pool, seed).await?;
        insert_offer(pool, DEMO_CAMPAIGN_ID, &seed.id, 2_500, 90).await?;
    }
    insert_tracking_number(pool, DEMO_TRACKING_NUMBER, DEMO_CAMPAIGN_ID, DEMO_SUPPLIER_ID).await?;

    Ok(SeedResult {
        supplier_id: DEMO_SUPPLIER_ID.to_string(),
        campaign_id: DEMO_CAMPAIGN_ID.to_string(),
        buyer_ids: seeds.iter().map(|seed| seed.id.clone()).collect(),
        tracking_number: DEMO_TRACKING_NUMBER.to_string(),
    })
}

pub fn demo_campaign(campaign_id: &str) -> Campaign {
    Campaign {
        id: CampaignId(campaign_id.to_string()),
        name: format!("Campaign {campaign_id}"),
        vertical: "auto_insurance".to_string(),
        supplier_id: SupplierId(DEMO_SUPPLIER_ID.to_string()),
        status: ActivityStatus::Active,
    }
}

pub fn demo_buyer(buyer_id: &str, tier: i32, weight: i32, caps: BuyerCaps) -> Buyer {
    Buyer {
        id: BuyerId(buyer_id.to_string()),
        name: format!("Buyer {buyer_id}"),
        endpoint_type: EndpointType::PhoneNumber,
        endpoint_value: "+15005550006".to_string(),
        concurrency_limit: None,
        tier,
        weight,
        status: ActivityStatus::Active,
        schedule_timezone: None,
        caps,
    }
}

pub fn demo_offer(
    campaign_id: &str,
    buyer_id: &str,
    payout_cents: i64,
    buffer_seconds: i64,
) -> Offer {
    Offer {
        id: OfferId(format!("offer-{buyer_id}")),
        campaign_id: CampaignId(campaign_id.to_string()),
        buyer_id: BuyerId(buyer_id.to_string()),
        pricing_model: PricingModel::Cpa,
        payout_cents,
        buffer_seconds,
        attribution_window_days: Some(30),
        priority: 0,
        weight: 100,
        daily_cap: None,
        is_active: true,
    }
}

/// Mirrors [`seed_demo`] for the in-memory store.
pub async fn seed_memory(store: &InMemoryExchangeStore) -> SeedResult {
    store.insert_campaign(demo_campaign(DEMO_CAMPAIGN_ID)).await;

    let seeds = demo_buyer_seeds();
    for seed in &seeds {
        let caps = BuyerCaps { daily_call_cap: seed.daily_call_cap, ..BuyerCaps::default() };
        let mut buyer = demo_buyer(&seed.id, seed.tier, seed.weight, caps);
        buyer.endpoint_type = seed.endpoint_type.clone();
        buyer.endpoint_value = seed.endpoint_value.clone();
        store.insert_buyer(buyer).await;
        store.insert_offer(demo_offer(DEMO_CAMPAIGN_ID, &seed.id, 2_500, 90)).await;
    }
    store
        .insert_tracking_number(TrackingNumber {
            e164: DEMO_TRACKING_NUMBER.to_string(),
            campaign_id: CampaignId(DEMO_CAMPAIGN_ID.to_string()),
            supplier_id: SupplierId(DEMO_SUPPLIER_ID.to_string()),
            status: ActivityStatus::Active,
        })
        .await;

    SeedResult {
        supplier_id: DEMO_SUPPLIER_ID.to_string(),
        campaign_id: DEMO_CAMPAIGN_ID.to_string(),
        buyer_ids: seeds.iter().map(|seed| seed.id.clone()).collect(),
        tracking_number: DEMO_TRACKING_NUMBER.to_string(),
    }
}
