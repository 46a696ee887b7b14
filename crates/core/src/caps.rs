//! Per-buyer cap counters and the reservation rule shared by every store.
//!
//! Windows (calendar day/month, buyer timezone) are owned by whoever resets the
//! `*_used` counters; the ledger only compares what it is handed.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::buyer::BuyerId;
use crate::store::{CapLedgerStore, StoreError};

/// Limit/used pairs for one buyer. A `None` limit means uncapped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerCaps {
    pub daily_call_cap: Option<i64>,
    pub daily_calls_used: i64,
    pub daily_revenue_cap_cents: Option<i64>,
    pub daily_revenue_used_cents: i64,
    pub monthly_revenue_cap_cents: Option<i64>,
    pub monthly_revenue_used_cents: i64,
    pub monthly_conversion_limit: Option<i64>,
    pub monthly_conversion_used: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapViolation {
    DailyCallCap,
    DailyRevenueCap,
    MonthlyRevenueCap,
    MonthlyConversionCap,
}

impl CapViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyCallCap => "daily_call_cap",
            Self::DailyRevenueCap => "daily_revenue_cap",
            Self::MonthlyRevenueCap => "monthly_revenue_cap",
            Self::MonthlyConversionCap => "monthly_conversion_cap",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapReservation {
    Reserved,
    Exhausted(CapViolation),
}

fn reached(limit: Option<i64>, used: i64) -> bool {
    limit.is_some_and(|limit| used >= limit)
}

impl BuyerCaps {
    /// First exhausted cap, checked in order: daily calls, daily revenue, monthly
    /// revenue, monthly conversions.
    pub fn first_violation(&self) -> Option<CapViolation> {
        if reached(self.daily_call_cap, self.daily_calls_used) {
            return Some(CapViolation::DailyCallCap);
        }
        if reached(self.daily_revenue_cap_cents, self.daily_revenue_used_cents) {
            return Some(CapViolation::DailyRevenueCap);
        }
        if reached(self.monthly_revenue_cap_cents, self.monthly_revenue_used_cents) {
            return Some(CapViolation::MonthlyRevenueCap);
        }
        if reached(self.monthly_conversion_limit, self.monthly_conversion_used) {
            return Some(CapViolation::MonthlyConversionCap);
        }
        None
    }

    /// Check-and-increment of the daily call counter. Callers must hold whatever lock
    /// makes this atomic for their storage; nothing is mutated on exhaustion.
    pub fn reserve_call(&mut self) -> CapReservation {
        match self.first_violation() {
            Some(violation) => CapReservation::Exhausted(violation),
            None => {
                self.daily_calls_used += 1;
                CapReservation::Reserved
            }
        }
    }

    /// Revenue is only known after the call ends (or converts), so it is credited
    /// separately from the call reservation.
    pub fn credit_revenue(&mut self, delta_cents: i64) {
        if delta_cents > 0 {
            self.daily_revenue_used_cents += delta_cents;
            self.monthly_revenue_used_cents += delta_cents;
        }
    }
}

/// Timeout-bounded front for [`CapLedgerStore`].
#[derive(Clone)]
pub struct CapLedger {
    store: Arc<dyn CapLedgerStore>,
    timeout: Duration,
}

impl CapLedger {
    pub fn new(store: Arc<dyn CapLedgerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn try_reserve(&self, buyer_id: &BuyerId) -> Result<CapReservation, StoreError> {
        let reservation =
            tokio::time::timeout(self.timeout, self.store.reserve_buyer_capacity(buyer_id))
                .await
                .map_err(|_| StoreError::Timeout)??;

        if let CapReservation::Exhausted(violation) = reservation {
            debug!(
                event_name = "caps.reservation.exhausted",
                buyer_id = %buyer_id.0,
                reason = violation.as_str(),
                "buyer cap exhausted"
            );
        }
        Ok(reservation)
    }
}
