use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use dcx_core::caps::BuyerCaps;
use dcx_core::domain::buyer::{Buyer, BuyerId, EndpointType};
use dcx_core::domain::campaign::{CampaignId, SupplierId};
use dcx_core::domain::number::TrackingNumber;
use dcx_core::domain::offer::{Offer, OfferId, PricingModel};
use dcx_core::domain::ActivityStatus;
use dcx_core::routing::RoutingCandidate;
use dcx_core::store::{CandidatePage, OfferCatalog, StoreError};

use super::{parse_i32, parse_optional_u32, RepositoryError};
use crate::DbPool;

const OFFER_COLUMNS: &str = "
    o.id AS offer_id,
    o.campaign_id,
    o.buyer_id,
    o.pricing_model,
    o.payout_cents,
    o.buffer_seconds,
    o.attribution_window_days,
    o.priority,
    o.weight AS offer_weight,
    o.daily_cap,
    o.is_active";

const BUYER_COLUMNS: &str = "
    b.name AS buyer_name,
    b.endpoint_type,
    b.endpoint_value,
    b.concurrency_limit,
    b.tier,
    b.weight AS buyer_weight,
    b.status AS buyer_status,
    b.schedule_timezone,
    b.daily_call_cap,
    b.daily_calls_used,
    b.daily_revenue_cap_cents,
    b.daily_revenue_used_cents,
    b.monthly_revenue_cap_cents,
    b.monthly_revenue_used_cents,
    b.monthly_conversion_limit,
    b.monthly_conversion_used";

pub struct SqlOfferCatalog {
    pool: DbPool,
}

impl SqlOfferCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_active_offers(
        &self,
        campaign_id: &CampaignId,
        page: CandidatePage,
    ) -> Result<Vec<RoutingCandidate>, RepositoryError> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS}, {BUYER_COLUMNS}
             FROM offer o
             JOIN buyer b ON b.id = o.buyer_id
             JOIN campaign c ON c.id = o.campaign_id
             WHERE o.campaign_id = ?
               AND o.is_active = 1
               AND b.status = 'ACTIVE'
               AND c.status = 'ACTIVE'
             ORDER BY b.tier ASC, b.weight DESC, b.id ASC, o.id ASC
             LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(&campaign_id.0)
            .bind(i64::from(page.size))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(candidate_from_row).collect()
    }

    /// Active tracking numbers whose campaign is active, i.e. DIDs that can take a call.
    pub async fn count_routable_numbers(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM tracking_number t
             JOIN campaign c ON c.id = t.campaign_id
             WHERE t.status = 'ACTIVE' AND c.status = 'ACTIVE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn load_offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM offer o WHERE o.id = ?");
        let row = sqlx::query(&sql).bind(&offer_id.0).fetch_optional(&self.pool).await?;
        row.map(|row| offer_from_row(&row)).transpose()
    }

    async fn load_tracking_number(
        &self,
        e164: &str,
    ) -> Result<Option<TrackingNumber>, RepositoryError> {
        let row = sqlx::query(
            "SELECT e164, campaign_id, supplier_id, status
             FROM tracking_number
             WHERE e164 = ?",
        )
        .bind(e164)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| number_from_row(&row)).transpose()
    }
}

#[async_trait]
impl OfferCatalog for SqlOfferCatalog {
    async fn find_active_offers(
        &self,
        campaign_id: &CampaignId,
        page: CandidatePage,
    ) -> Result<Vec<RoutingCandidate>, StoreError> {
        Ok(self.load_active_offers(campaign_id, page).await?)
    }

    async fn find_offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, StoreError> {
        Ok(self.load_offer(offer_id).await?)
    }

    async fn find_tracking_number(
        &self,
        e164: &str,
    ) -> Result<Option<TrackingNumber>, StoreError> {
        Ok(self.load_tracking_number(e164).await?)
    }
}

fn number_from_row(row: &SqliteRow) -> Result<TrackingNumber, RepositoryError> {
    Ok(TrackingNumber {
        e164: row.try_get("e164")?,
        campaign_id: CampaignId(row.try_get("campaign_id")?),
        supplier_id: SupplierId(row.try_get("supplier_id")?),
        status: ActivityStatus::parse(&row.try_get::<String, _>("status")?),
    })
}

fn offer_from_row(row: &SqliteRow) -> Result<Offer, RepositoryError> {
    Ok(Offer {
        id: OfferId(row.try_get("offer_id")?),
        campaign_id: CampaignId(row.try_get("campaign_id")?),
        buyer_id: BuyerId(row.try_get("buyer_id")?),
        pricing_model: PricingModel::parse(&row.try_get::<String, _>("pricing_model")?),
        payout_cents: row.try_get("payout_cents")?,
        buffer_seconds: row.try_get("buffer_seconds")?,
        attribution_window_days: row.try_get("attribution_window_days")?,
        priority: parse_i32("priority", row.try_get("priority")?)?,
        weight: parse_i32("offer.weight", row.try_get("offer_weight")?)?,
        daily_cap: row.try_get("daily_cap")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
    })
}

fn candidate_from_row(row: SqliteRow) -> Result<RoutingCandidate, RepositoryError> {
    let offer = offer_from_row(&row)?;
    let buyer = Buyer {
        id: offer.buyer_id.clone(),
        name: row.try_get("buyer_name")?,
        endpoint_type: EndpointType::parse(&row.try_get::<String, _>("endpoint_type")?),
        endpoint_value: row.try_get("endpoint_value")?,
        concurrency_limit: parse_optional_u32(
            "concurrency_limit",
            row.try_get("concurrency_limit")?,
        )?,
        tier: parse_i32("tier", row.try_get("tier")?)?,
        weight: parse_i32("buyer.weight", row.try_get("buyer_weight")?)?,
        status: ActivityStatus::parse(&row.try_get::<String, _>("buyer_status")?),
        schedule_timezone: row.try_get("schedule_timezone")?,
        caps: caps_from_row(&row)?,
    };
    Ok(RoutingCandidate { buyer, offer })
}

pub(crate) fn caps_from_row(row: &SqliteRow) -> Result<BuyerCaps, RepositoryError> {
    Ok(BuyerCaps {
        daily_call_cap: row.try_get("daily_call_cap")?,
        daily_calls_used: row.try_get("daily_calls_used")?,
        daily_revenue_cap_cents: row.try_get("daily_revenue_cap_cents")?,
        daily_revenue_used_cents: row.try_get("daily_revenue_used_cents")?,
        monthly_revenue_cap_cents: row.try_get("monthly_revenue_cap_cents")?,
        monthly_revenue_used_cents: row.try_get("monthly_revenue_used_cents")?,
        monthly_conversion_limit: row.try_get("monthly_conversion_limit")?,
        monthly_conversion_used: row.try_get("monthly_conversion_used")?,
    })
}

#[cfg(test)]
mod tests {
    use dcx_core::domain::campaign::CampaignId;
    use dcx_core::domain::offer::OfferId;
    use dcx_core::store::{CandidatePage, OfferCatalog};

    use super::SqlOfferCatalog;
    use crate::fixtures::{insert_buyer, insert_campaign, insert_offer, BuyerSeed};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        insert_campaign(&pool, "sup-1", "camp-1").await.expect("campaign");
        pool
    }

    #[tokio::test]
    async fn active_offers_are_ordered_by_tier_then_weight() {
        let pool = setup_pool().await;
        insert_buyer(&pool, &BuyerSeed::phone("buyer-t2", 2, 50)).await.expect("buyer");
        insert_buyer(&pool, &BuyerSeed::phone("buyer-light", 1, 10)).await.expect("buyer");
        insert_buyer(&pool, &BuyerSeed::sip("buyer-heavy", 1, 20)).await.expect("buyer");
        for buyer in ["buyer-t2", "buyer-light", "buyer-heavy"] {
            insert_offer(&pool, "camp-1", buyer, 10_000, 60).await.expect("offer");
        }

        let catalog = SqlOfferCatalog::new(pool.clone());
        let candidates = catalog
            .find_active_offers(&CampaignId("camp-1".to_string()), CandidatePage::first(20))
            .await
            .expect("candidates");

        let order: Vec<&str> =
            candidates.iter().map(|candidate| candidate.buyer.id.0.as_str()).collect();
        assert_eq!(order, vec!["buyer-heavy", "buyer-light", "buyer-t2"]);
        assert_eq!(candidates[0].buyer.endpoint_value, "sip:buyer-heavy@sip.example.com");

        pool.close().await;
    }

    #[tokio::test]
    async fn pages_continue_where_the_previous_one_stopped() {
        let pool = setup_pool().await;
        let buyers = [("b-1", 1, 30), ("b-2", 1, 20), ("b-3", 1, 10), ("b-4", 2, 90)];
        for (buyer, tier, weight) in buyers {
            insert_buyer(&pool, &BuyerSeed::phone(buyer, tier, weight)).await.expect("buyer");
            insert_offer(&pool, "camp-1", buyer, 10_000, 60).await.expect("offer");
        }

        let catalog = SqlOfferCatalog::new(pool.clone());
        let campaign = CampaignId("camp-1".to_string());
        let first = CandidatePage::first(3);
        let head = catalog.find_active_offers(&campaign, first).await.expect("first page");
        let tail = catalog.find_active_offers(&campaign, first.next()).await.expect("next page");

        let ids = |page: &[dcx_core::routing::RoutingCandidate]| {
            page.iter().map(|candidate| candidate.buyer.id.0.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&head), vec!["b-1", "b-2", "b-3"]);
        assert_eq!(ids(&tail), vec!["b-4"]);
        assert!(!first.is_last(head.len()));
        assert!(first.next().is_last(tail.len()));

        pool.close().await;
    }

    #[tokio::test]
    async fn inactive_offers_and_buyers_are_excluded() {
        let pool = setup_pool().await;
        insert_buyer(&pool, &BuyerSeed::phone("buyer-on", 1, 10)).await.expect("buyer");
        insert_buyer(&pool, &BuyerSeed { active: false, ..BuyerSeed::phone("buyer-off", 1, 90) })
            .await
            .expect("buyer");
        insert_offer(&pool, "camp-1", "buyer-on", 10_000, 60).await.expect("offer");
        insert_offer(&pool, "camp-1", "buyer-off", 10_000, 60).await.expect("offer");
        sqlx::query("UPDATE offer SET is_active = 0 WHERE buyer_id = 'buyer-on'")
            .execute(&pool)
            .await
            .expect("deactivate");

        let catalog = SqlOfferCatalog::new(pool.clone());
        let candidates = catalog
            .find_active_offers(&CampaignId("camp-1".to_string()), CandidatePage::first(20))
            .await
            .expect("candidates");
        assert!(candidates.is_empty());

        let offer = catalog
            .find_offer(&OfferId("offer-buyer-on".to_string()))
            .await
            .expect("find offer")
            .expect("offer row");
        assert!(!offer.is_active);
        assert_eq!(offer.terms().buffer_seconds, 60);

        pool.close().await;
    }

    #[tokio::test]
    async fn tracking_numbers_resolve_to_campaign() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO tracking_number (e164, campaign_id, supplier_id, status)
             VALUES ('+18005550100', 'camp-1', 'sup-1', 'ACTIVE')",
        )
        .execute(&pool)
        .await
        .expect("insert number");

        let catalog = SqlOfferCatalog::new(pool.clone());
        let number = catalog
            .find_tracking_number("+18005550100")
            .await
            .expect("lookup")
            .expect("number row");
        assert_eq!(number.campaign_id.0, "camp-1");
        assert!(catalog.find_tracking_number("+18005550199").await.expect("lookup").is_none());

        pool.close().await;
    }
}
