//! Telephony cost and buyer payout for one call.
//!
//! Everything here is a pure function of the call duration and the offer terms, so a
//! retried terminal callback recomputes exactly the same figures.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Flat carrier rate used when nothing is configured: $0.014/min.
pub fn default_cost_per_minute_cents() -> Decimal {
    Decimal::new(14, 1)
}

/// The slice of an offer the calculator needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    pub payout_cents: i64,
    /// Minimum connected duration before the payout is earned.
    pub buffer_seconds: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEconomics {
    pub duration_seconds: i64,
    pub billed_minutes: i64,
    pub telephony_cost_cents: i64,
    pub revenue_estimated_cents: i64,
}

impl CallEconomics {
    /// Calls without terms (routing failed or never ran) still cost money but earn nothing.
    pub fn compute(
        duration_seconds: i64,
        terms: Option<&OfferTerms>,
        cost_per_minute_cents: Decimal,
    ) -> Self {
        let duration_seconds = duration_seconds.max(0);
        let billed_minutes = billed_minutes(duration_seconds);
        Self {
            duration_seconds,
            billed_minutes,
            telephony_cost_cents: telephony_cost_cents(billed_minutes, cost_per_minute_cents),
            revenue_estimated_cents: revenue_estimate(duration_seconds, terms),
        }
    }
}

/// Carriers bill whole minutes with a one-minute floor.
pub fn billed_minutes(duration_seconds: i64) -> i64 {
    let duration_seconds = duration_seconds.max(0);
    ((duration_seconds + 59) / 60).max(1)
}

pub fn telephony_cost_cents(billed_minutes: i64, cost_per_minute_cents: Decimal) -> i64 {
    (Decimal::from(billed_minutes) * cost_per_minute_cents)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

pub fn revenue_estimate(duration_seconds: i64, terms: Option<&OfferTerms>) -> i64 {
    match terms {
        Some(terms) if duration_seconds >= terms.buffer_seconds => terms.payout_cents,
        _ => 0,
    }
}

/// Conversion adjustment: revenue only ever moves up.
pub fn raise_revenue(current_cents: i64, reported_cents: Option<i64>) -> i64 {
    match reported_cents {
        Some(reported) => current_cents.max(reported),
        None => current_cents,
    }
}
