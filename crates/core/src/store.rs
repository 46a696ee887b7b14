//! Persistence ports consumed by routing and the call lifecycle.
//!
//! `dcx-db` provides the SQLite and in-memory implementations. Every method is a
//! single round-trip; callers wrap them in their own timeouts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::caps::CapReservation;
use crate::domain::buyer::BuyerId;
use crate::domain::call::{
    CallSession, CallSessionId, CallStatus, CarrierCallId, NewCallSession, PublicCallId,
    SealedCall,
};
use crate::domain::campaign::CampaignId;
use crate::domain::conversion::ConversionEvent;
use crate::domain::number::TrackingNumber;
use crate::domain::offer::{Offer, OfferId};
use crate::routing::RoutingCandidate;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store round-trip timed out")]
    Timeout,
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Only backend failures are worth retrying; decode and lookup failures are
    /// deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// One window over a campaign's candidate list.
///
/// Catalogs return candidates in tier order (see [`crate::routing::tier_order`]), so
/// consecutive pages read as one continuous list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidatePage {
    pub offset: u32,
    pub size: u32,
}

impl CandidatePage {
    pub fn first(size: u32) -> Self {
        Self { offset: 0, size: size.max(1) }
    }

    pub fn next(self) -> Self {
        Self { offset: self.offset.saturating_add(self.size), size: self.size }
    }

    /// A page shorter than its size is the tail of the list.
    pub fn is_last(&self, returned: usize) -> bool {
        returned < self.size as usize
    }
}

/// Outcome of the idempotent create keyed by carrier call id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionUpsert {
    pub session: CallSession,
    pub created: bool,
}

/// Revenue state after a conversion event has been appended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionWrite {
    pub revenue_estimated_cents: i64,
    pub raised: bool,
}

#[async_trait]
pub trait OfferCatalog: Send + Sync {
    /// Active offers whose buyer is active, for an active campaign, in tier order and
    /// restricted to `page`.
    async fn find_active_offers(
        &self,
        campaign_id: &CampaignId,
        page: CandidatePage,
    ) -> Result<Vec<RoutingCandidate>, StoreError>;

    async fn find_offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, StoreError>;

    async fn find_tracking_number(
        &self,
        e164: &str,
    ) -> Result<Option<TrackingNumber>, StoreError>;
}

#[async_trait]
pub trait CapLedgerStore: Send + Sync {
    /// Atomic check-and-increment of the buyer's daily call counter. Two concurrent
    /// calls against a buyer's last free slot must not both return `Reserved`.
    async fn reserve_buyer_capacity(
        &self,
        buyer_id: &BuyerId,
    ) -> Result<CapReservation, StoreError>;
}

#[async_trait]
pub trait CallSessionStore: Send + Sync {
    /// Inserts the session, or returns the existing row if the carrier call id is
    /// already known.
    async fn create_or_fetch(&self, session: NewCallSession) -> Result<SessionUpsert, StoreError>;

    async fn find_by_id(&self, id: &CallSessionId) -> Result<Option<CallSession>, StoreError>;

    async fn find_by_public_id(
        &self,
        public_id: &PublicCallId,
    ) -> Result<Option<CallSession>, StoreError>;

    async fn find_by_carrier_call_id(
        &self,
        carrier_call_id: &CarrierCallId,
    ) -> Result<Option<CallSession>, StoreError>;

    async fn attach_route(
        &self,
        id: &CallSessionId,
        buyer_id: &BuyerId,
        offer_id: &OfferId,
    ) -> Result<(), StoreError>;

    /// Moves a non-terminal session forward only if it still holds `expected`, stamping
    /// `answered_at` when `next` is IN_PROGRESS. Returns whether the write won.
    async fn advance_status(
        &self,
        id: &CallSessionId,
        expected: CallStatus,
        next: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Writes the terminal status and economics only if the session is still
    /// non-terminal, and credits the routed buyer's revenue counters in the same
    /// transaction. Returns whether the write won.
    async fn seal_terminal(&self, id: &CallSessionId, sealed: &SealedCall)
        -> Result<bool, StoreError>;

    /// Appends the event and raises the session's estimated revenue if the event
    /// reports more than it currently holds.
    async fn append_conversion(
        &self,
        event: &ConversionEvent,
    ) -> Result<ConversionWrite, StoreError>;

    async fn list_conversions(
        &self,
        id: &CallSessionId,
    ) -> Result<Vec<ConversionEvent>, StoreError>;
}
