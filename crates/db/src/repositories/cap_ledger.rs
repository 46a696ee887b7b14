use async_trait::async_trait;

use dcx_core::caps::{CapReservation, CapViolation};
use dcx_core::domain::buyer::BuyerId;
use dcx_core::store::{CapLedgerStore, StoreError};

use super::catalog::caps_from_row;
use super::RepositoryError;
use crate::DbPool;

/// Cap reservation as a single conditional `UPDATE`. SQLite serializes writers, so two
/// routers racing for a buyer's last slot cannot both see a changed row.
pub struct SqlCapLedger {
    pool: DbPool,
}

impl SqlCapLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn reserve(&self, buyer_id: &BuyerId) -> Result<CapReservation, RepositoryError> {
        let result = sqlx::query(
            "UPDATE buyer
             SET daily_calls_used = daily_calls_used + 1
             WHERE id = ?
               AND (daily_call_cap IS NULL OR daily_calls_used < daily_call_cap)
               AND (daily_revenue_cap_cents IS NULL
                    OR daily_revenue_used_cents < daily_revenue_cap_cents)
               AND (monthly_revenue_cap_cents IS NULL
                    OR monthly_revenue_used_cents < monthly_revenue_cap_cents)
               AND (monthly_conversion_limit IS NULL
                    OR monthly_conversion_used < monthly_conversion_limit)",
        )
        .bind(&buyer_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(CapReservation::Reserved);
        }

        // Nothing changed: either the buyer is gone or a cap is reached. Re-read only to
        // name the violated cap; the decision was already made by the UPDATE.
        let row = sqlx::query(
            "SELECT
                daily_call_cap,
                daily_calls_used,
                daily_revenue_cap_cents,
                daily_revenue_used_cents,
                monthly_revenue_cap_cents,
                monthly_revenue_used_cents,
                monthly_conversion_limit,
                monthly_conversion_used
             FROM buyer
             WHERE id = ?",
        )
        .bind(&buyer_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("buyer `{}`", buyer_id.0)))?;

        let caps = caps_from_row(&row)?;
        Ok(CapReservation::Exhausted(caps.first_violation().unwrap_or(CapViolation::DailyCallCap)))
    }
}

#[async_trait]
impl CapLedgerStore for SqlCapLedger {
    async fn reserve_buyer_capacity(
        &self,
        buyer_id: &BuyerId,
    ) -> Result<CapReservation, StoreError> {
        Ok(self.reserve(buyer_id).await?)
    }
}
