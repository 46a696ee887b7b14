use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use dcx_core::domain::buyer::BuyerId;
use dcx_core::domain::call::{
    CallSession, CallSessionId, CallStatus, CarrierCallId, NewCallSession, PublicCallId,
    SealedCall,
};
use dcx_core::domain::campaign::{CampaignId, SupplierId};
use dcx_core::domain::conversion::{ConversionEvent, ConversionEventId, ConversionSource};
use dcx_core::domain::offer::OfferId;
use dcx_core::economics::raise_revenue;
use dcx_core::store::{CallSessionStore, ConversionWrite, SessionUpsert, StoreError};

use super::{parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

const SESSION_COLUMNS: &str = "
    id,
    public_id,
    trace_id,
    carrier_call_id,
    from_number,
    to_number,
    campaign_id,
    supplier_id,
    buyer_id,
    offer_id,
    status,
    created_at,
    answered_at,
    ended_at,
    duration_seconds,
    billable_duration_seconds,
    telephony_cost_cents,
    revenue_estimated_cents";

const NON_TERMINAL_GUARD: &str = "status IN ('INITIATED', 'RINGING', 'IN_PROGRESS')";

pub struct SqlCallSessionRepository {
    pool: DbPool,
}

impl SqlCallSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_or_fetch(&self, new: NewCallSession) -> Result<SessionUpsert, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO call_session (
                id,
                public_id,
                trace_id,
                carrier_call_id,
                from_number,
                to_number,
                campaign_id,
                supplier_id,
                status,
                created_at,
                revenue_estimated_cents
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
             ON CONFLICT(carrier_call_id) DO NOTHING",
        )
        .bind(&new.id.0)
        .bind(&new.public_id.0)
        .bind(&new.trace_id)
        .bind(&new.carrier_call_id.0)
        .bind(&new.from_number)
        .bind(&new.to_number)
        .bind(&new.campaign_id.0)
        .bind(&new.supplier_id.0)
        .bind(CallStatus::Initiated.as_str())
        .bind(new.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(SessionUpsert { session: CallSession::initiated(new), created: true });
        }

        let existing = self.load_one("carrier_call_id", &new.carrier_call_id.0).await?;
        existing.map(|session| SessionUpsert { session, created: false }).ok_or_else(|| {
            RepositoryError::NotFound(format!(
                "call session for carrier call `{}` vanished after conflict",
                new.carrier_call_id.0
            ))
        })
    }

    async fn load_one(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<CallSession>, RepositoryError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM call_session WHERE {column} = ?");
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;
        row.map(session_from_row).transpose()
    }

    async fn set_route(
        &self,
        id: &CallSessionId,
        buyer_id: &BuyerId,
        offer_id: &OfferId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE call_session SET buyer_id = ?, offer_id = ? WHERE id = ?")
            .bind(&buyer_id.0)
            .bind(&offer_id.0)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("call session `{}`", id.0)));
        }
        Ok(())
    }

    async fn conditional_advance(
        &self,
        id: &CallSessionId,
        expected: CallStatus,
        next: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE call_session
             SET status = ?,
                 answered_at = CASE WHEN ? = 'IN_PROGRESS'
                                    THEN COALESCE(answered_at, ?)
                                    ELSE answered_at END
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(next.as_str())
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn seal(&self, id: &CallSessionId, sealed: &SealedCall) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The guarded write comes first so the transaction holds the write lock before
        // it reads the revenue it is about to credit.
        let sql = format!(
            "UPDATE call_session
             SET status = ?,
                 ended_at = ?,
                 duration_seconds = ?,
                 billable_duration_seconds = ?,
                 telephony_cost_cents = ?
             WHERE id = ? AND {NON_TERMINAL_GUARD}"
        );
        let result = sqlx::query(&sql)
            .bind(sealed.status.as_str())
            .bind(sealed.ended_at.to_rfc3339())
            .bind(sealed.duration_seconds)
            .bind(sealed.billable_duration_seconds)
            .bind(sealed.telephony_cost_cents)
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let (current, buyer_id) = revenue_and_buyer(&mut tx, id).await?;
        let raised = current.max(sealed.revenue_estimated_cents);
        if raised > current {
            set_revenue(&mut tx, id, raised).await?;
            if let Some(buyer_id) = &buyer_id {
                credit_buyer_revenue(&mut tx, buyer_id, raised - current).await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn append(&self, event: &ConversionEvent) -> Result<ConversionWrite, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversion_event (
                id,
                call_session_id,
                buyer_id,
                event_type,
                event_time,
                revenue_cents,
                source,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(&event.call_session_id.0)
        .bind(&event.buyer_id.0)
        .bind(&event.event_type)
        .bind(event.event_time.to_rfc3339())
        .bind(event.revenue_cents)
        .bind(event.source.as_str())
        .bind(event.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let (current, _) = revenue_and_buyer(&mut tx, &event.call_session_id).await?;
        let next = raise_revenue(current, event.revenue_cents);
        if next > current {
            set_revenue(&mut tx, &event.call_session_id, next).await?;
            credit_buyer_revenue(&mut tx, &event.buyer_id, next - current).await?;
        }

        sqlx::query(
            "UPDATE buyer SET monthly_conversion_used = monthly_conversion_used + 1 WHERE id = ?",
        )
        .bind(&event.buyer_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ConversionWrite { revenue_estimated_cents: next, raised: next > current })
    }

    async fn load_conversions(
        &self,
        id: &CallSessionId,
    ) -> Result<Vec<ConversionEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                call_session_id,
                buyer_id,
                event_type,
                event_time,
                revenue_cents,
                source,
                created_at
             FROM conversion_event
             WHERE call_session_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(conversion_from_row).collect()
    }
}

async fn revenue_and_buyer(
    tx: &mut Transaction<'_, Sqlite>,
    id: &CallSessionId,
) -> Result<(i64, Option<BuyerId>), RepositoryError> {
    let row = sqlx::query("SELECT revenue_estimated_cents, buyer_id FROM call_session WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("call session `{}`", id.0)))?;

    let revenue = row.try_get::<i64, _>("revenue_estimated_cents")?;
    let buyer_id = row.try_get::<Option<String>, _>("buyer_id")?.map(BuyerId);
    Ok((revenue, buyer_id))
}

async fn set_revenue(
    tx: &mut Transaction<'_, Sqlite>,
    id: &CallSessionId,
    revenue_cents: i64,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE call_session SET revenue_estimated_cents = ? WHERE id = ?")
        .bind(revenue_cents)
        .bind(&id.0)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn credit_buyer_revenue(
    tx: &mut Transaction<'_, Sqlite>,
    buyer_id: &BuyerId,
    delta_cents: i64,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE buyer
         SET daily_revenue_used_cents = daily_revenue_used_cents + ?,
             monthly_revenue_used_cents = monthly_revenue_used_cents + ?
         WHERE id = ?",
    )
    .bind(delta_cents)
    .bind(delta_cents)
    .bind(&buyer_id.0)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl CallSessionStore for SqlCallSessionRepository {
    async fn create_or_fetch(&self, session: NewCallSession) -> Result<SessionUpsert, StoreError> {
        Ok(self.insert_or_fetch(session).await?)
    }

    async fn find_by_id(&self, id: &CallSessionId) -> Result<Option<CallSession>, StoreError> {
        Ok(self.load_one("id", &id.0).await?)
    }

    async fn find_by_public_id(
        &self,
        public_id: &PublicCallId,
    ) -> Result<Option<CallSession>, StoreError> {
        Ok(self.load_one("public_id", &public_id.0).await?)
    }

    async fn find_by_carrier_call_id(
        &self,
        carrier_call_id: &CarrierCallId,
    ) -> Result<Option<CallSession>, StoreError> {
        Ok(self.load_one("carrier_call_id", &carrier_call_id.0).await?)
    }

    async fn attach_route(
        &self,
        id: &CallSessionId,
        buyer_id: &BuyerId,
        offer_id: &OfferId,
    ) -> Result<(), StoreError> {
        Ok(self.set_route(id, buyer_id, offer_id).await?)
    }

    async fn advance_status(
        &self,
        id: &CallSessionId,
        expected: CallStatus,
        next: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.conditional_advance(id, expected, next, at).await?)
    }

    async fn seal_terminal(
        &self,
        id: &CallSessionId,
        sealed: &SealedCall,
    ) -> Result<bool, StoreError> {
        Ok(self.seal(id, sealed).await?)
    }

    async fn append_conversion(
        &self,
        event: &ConversionEvent,
    ) -> Result<ConversionWrite, StoreError> {
        Ok(self.append(event).await?)
    }

    async fn list_conversions(
        &self,
        id: &CallSessionId,
    ) -> Result<Vec<ConversionEvent>, StoreError> {
        Ok(self.load_conversions(id).await?)
    }
}

fn session_from_row(row: SqliteRow) -> Result<CallSession, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = CallStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown call status `{status_raw}`")))?;

    Ok(CallSession {
        id: CallSessionId(row.try_get("id")?),
        public_id: PublicCallId(row.try_get("public_id")?),
        trace_id: row.try_get("trace_id")?,
        carrier_call_id: CarrierCallId(row.try_get("carrier_call_id")?),
        from_number: row.try_get("from_number")?,
        to_number: row.try_get("to_number")?,
        campaign_id: CampaignId(row.try_get("campaign_id")?),
        supplier_id: SupplierId(row.try_get("supplier_id")?),
        buyer_id: row.try_get::<Option<String>, _>("buyer_id")?.map(BuyerId),
        offer_id: row.try_get::<Option<String>, _>("offer_id")?.map(OfferId),
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        answered_at: parse_optional_timestamp("answered_at", row.try_get("answered_at")?)?,
        ended_at: parse_optional_timestamp("ended_at", row.try_get("ended_at")?)?,
        duration_seconds: row.try_get("duration_seconds")?,
        billable_duration_seconds: row.try_get("billable_duration_seconds")?,
        telephony_cost_cents: row.try_get("telephony_cost_cents")?,
        revenue_estimated_cents: row.try_get("revenue_estimated_cents")?,
    })
}

fn conversion_from_row(row: SqliteRow) -> Result<ConversionEvent, RepositoryError> {
    let source_raw = row.try_get::<String, _>("source")?;
    let source = ConversionSource::parse(&source_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown conversion source `{source_raw}`"))
    })?;

    Ok(ConversionEvent {
        id: ConversionEventId(row.try_get("id")?),
        call_session_id: CallSessionId(row.try_get("call_session_id")?),
        buyer_id: BuyerId(row.try_get("buyer_id")?),
        event_type: row.try_get("event_type")?,
        event_time: parse_timestamp("event_time", row.try_get("event_time")?)?,
        revenue_cents: row.try_get("revenue_cents")?,
        source,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use sqlx::Row;

    use dcx_core::domain::buyer::BuyerId;
    use dcx_core::domain::call::{
        CallSessionId, CallStatus, CarrierCallId, NewCallSession, PublicCallId, SealedCall,
    };
    use dcx_core::domain::campaign::{CampaignId, SupplierId};
    use dcx_core::domain::conversion::{ConversionEvent, ConversionEventId, ConversionSource};
    use dcx_core::domain::offer::OfferId;
    use dcx_core::store::{CallSessionStore, StoreError};

    use super::SqlCallSessionRepository;
    use crate::fixtures::{insert_buyer, insert_campaign, insert_offer, BuyerSeed};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        insert_campaign(&pool, "sup-1", "camp-1").await.expect("campaign");
        insert_buyer(&pool, &BuyerSeed::phone("buyer-1", 1, 10)).await.expect("buyer");
        insert_offer(&pool, "camp-1", "buyer-1", 10_000, 60).await.expect("offer");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn new_session(id: &str, carrier_call_id: &str) -> NewCallSession {
        NewCallSession {
            id: CallSessionId(id.to_string()),
            public_id: PublicCallId(format!("pub-{id}")),
            trace_id: format!("trace-{id}"),
            carrier_call_id: CarrierCallId(carrier_call_id.to_string()),
            from_number: "+15550000001".to_string(),
            to_number: "+18005550100".to_string(),
            campaign_id: CampaignId("camp-1".to_string()),
            supplier_id: SupplierId("sup-1".to_string()),
            created_at: parse_ts("2026-03-01T12:00:00Z"),
        }
    }

    fn sealed(status: CallStatus, revenue: i64) -> SealedCall {
        SealedCall {
            status,
            ended_at: parse_ts("2026-03-01T12:05:00Z"),
            duration_seconds: 65,
            billable_duration_seconds: 65,
            telephony_cost_cents: 3,
            revenue_estimated_cents: revenue,
        }
    }

    async fn buyer_revenue(pool: &DbPool) -> (i64, i64, i64) {
        let row = sqlx::query(
            "SELECT daily_revenue_used_cents, monthly_revenue_used_cents, monthly_conversion_used
             FROM buyer WHERE id = 'buyer-1'",
        )
        .fetch_one(pool)
        .await
        .expect("buyer row");
        (row.get(0), row.get(1), row.get(2))
    }

    #[tokio::test]
    async fn duplicate_carrier_call_id_returns_existing_row() {
        let pool = setup_pool().await;
        let repo = SqlCallSessionRepository::new(pool.clone());

        let first = repo.create_or_fetch(new_session("cs-1", "CA-1")).await.expect("create");
        let second = repo.create_or_fetch(new_session("cs-2", "CA-1")).await.expect("retry");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.session, first.session);

        let count: i64 = sqlx::query("SELECT COUNT(*) FROM call_session")
            .fetch_one(&pool)
            .await
            .expect("count")
            .get(0);
        assert_eq!(count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn advance_is_conditional_and_stamps_answered_at() {
        let pool = setup_pool().await;
        let repo = SqlCallSessionRepository::new(pool.clone());
        repo.create_or_fetch(new_session("cs-1", "CA-1")).await.expect("create");
        let id = CallSessionId("cs-1".to_string());
        let answered = parse_ts("2026-03-01T12:00:10Z");

        let won = repo
            .advance_status(&id, CallStatus::Initiated, CallStatus::InProgress, answered)
            .await
            .expect("advance");
        let lost = repo
            .advance_status(&id, CallStatus::Initiated, CallStatus::Ringing, answered)
            .await
            .expect("advance");

        assert!(won);
        assert!(!lost);
        let session = repo.find_by_id(&id).await.expect("find").expect("row");
        assert_eq!(session.status, CallStatus::InProgress);
        assert_eq!(session.answered_at, Some(answered));

        pool.close().await;
    }

    #[tokio::test]
    async fn seal_is_first_writer_wins_and_credits_buyer_once() {
        let pool = setup_pool().await;
        let repo = SqlCallSessionRepository::new(pool.clone());
        repo.create_or_fetch(new_session("cs-1", "CA-1")).await.expect("create");
        let id = CallSessionId("cs-1".to_string());
        repo.attach_route(
            &id,
            &BuyerId("buyer-1".to_string()),
            &OfferId("offer-buyer-1".to_string()),
        )
        .await
        .expect("attach");

        let completed = sealed(CallStatus::Completed, 10_000);
        assert!(repo.seal_terminal(&id, &completed).await.expect("first seal"));
        assert!(!repo.seal_terminal(&id, &completed).await.expect("duplicate seal"));
        assert!(!repo.seal_terminal(&id, &sealed(CallStatus::Failed, 0)).await.expect("conflict"));

        let session = repo.find_by_id(&id).await.expect("find").expect("row");
        assert_eq!(session.status, CallStatus::Completed);
        assert_eq!(session.telephony_cost_cents, Some(3));
        assert_eq!(session.revenue_estimated_cents, 10_000);
        assert_eq!(buyer_revenue(&pool).await, (10_000, 10_000, 0));

        pool.close().await;
    }

    #[tokio::test]
    async fn conversions_only_raise_revenue() {
        let pool = setup_pool().await;
        let repo = SqlCallSessionRepository::new(pool.clone());
        repo.create_or_fetch(new_session("cs-1", "CA-1")).await.expect("create");
        let id = CallSessionId("cs-1".to_string());
        repo.attach_route(
            &id,
            &BuyerId("buyer-1".to_string()),
            &OfferId("offer-buyer-1".to_string()),
        )
        .await
        .expect("attach");
        repo.seal_terminal(&id, &sealed(CallStatus::Completed, 10_000)).await.expect("seal");

        let event = |event_id: &str, revenue: i64| ConversionEvent {
            id: ConversionEventId(event_id.to_string()),
            call_session_id: id.clone(),
            buyer_id: BuyerId("buyer-1".to_string()),
            event_type: "sale".to_string(),
            event_time: parse_ts("2026-03-01T13:00:00Z"),
            revenue_cents: Some(revenue),
            source: ConversionSource::BuyerWebhook,
            created_at: parse_ts("2026-03-01T13:00:01Z"),
        };

        let lower = repo.append_conversion(&event("ev-1", 5_000)).await.expect("append");
        assert_eq!(lower.revenue_estimated_cents, 10_000);
        assert!(!lower.raised);

        let higher = repo.append_conversion(&event("ev-2", 15_000)).await.expect("append");
        assert_eq!(higher.revenue_estimated_cents, 15_000);
        assert!(higher.raised);

        assert_eq!(buyer_revenue(&pool).await, (15_000, 15_000, 2));
        let stored = repo.list_conversions(&id).await.expect("list");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].source, ConversionSource::BuyerWebhook);

        sqlx::query("UPDATE conversion_event SET source = 'IMPORTED' WHERE id = 'ev-1'")
            .execute(&pool)
            .await
            .expect("corrupt source");
        let decoded = repo.list_conversions(&id).await;
        assert!(
            matches!(&decoded, Err(StoreError::Decode(message)) if message.contains("IMPORTED")),
            "unknown source must surface as a decode error, got {decoded:?}"
        );

        pool.close().await;
    }
}
