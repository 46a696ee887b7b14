use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::buyer::BuyerId;
use crate::domain::campaign::{CampaignId, SupplierId};
use crate::domain::offer::OfferId;

/// Internal row id. Never leaves the platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSessionId(pub String);

/// Identifier shared with buyers (conversion webhooks, reporting exports).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicCallId(pub String);

/// The carrier's call identifier; unique per inbound call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarrierCallId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
}

/// Result of feeding a reported status into [`CallStatus::transition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Forward progress between non-terminal states.
    Advanced { from: CallStatus, to: CallStatus },
    /// First terminal status for the session; economics must run.
    Terminated { from: CallStatus, to: CallStatus },
    /// Re-delivery of the current non-terminal status.
    Unchanged,
    /// Re-delivery of the terminal status the session already holds.
    DuplicateTerminal,
    /// Out-of-order delivery (a status behind the current one); ignored.
    Stale { current: CallStatus, reported: CallStatus },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallTransitionError {
    #[error("call already ended as {current:?}; rejecting second terminal status {attempted:?}")]
    TerminalStateConflict { current: CallStatus, attempted: CallStatus },
}

impl CallStatus {
    /// Maps a raw carrier status string. Unrecognized values and `canceled` map to
    /// [`CallStatus::Failed`].
    pub fn from_carrier(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "initiated" => Self::Initiated,
            "ringing" => Self::Ringing,
            "in-progress" | "answered" => Self::InProgress,
            "completed" => Self::Completed,
            "busy" => Self::Busy,
            "no-answer" => Self::NoAnswer,
            _ => Self::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Ringing => "RINGING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Busy => "BUSY",
            Self::NoAnswer => "NO_ANSWER",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INITIATED" => Some(Self::Initiated),
            "RINGING" => Some(Self::Ringing),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "BUSY" => Some(Self::Busy),
            "NO_ANSWER" => Some(Self::NoAnswer),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Busy | Self::NoAnswer | Self::Failed)
    }

    pub fn non_terminal() -> [CallStatus; 3] {
        [Self::Initiated, Self::Ringing, Self::InProgress]
    }

    fn progress_rank(&self) -> u8 {
        match self {
            Self::Initiated => 0,
            Self::Ringing => 1,
            Self::InProgress => 2,
            Self::Completed | Self::Busy | Self::NoAnswer | Self::Failed => 3,
        }
    }

    /// The single transition function for call sessions.
    ///
    /// Any terminal status is accepted from any non-terminal state, so carriers that
    /// collapse updates (`INITIATED -> COMPLETED`) are fine. Once terminal, the same
    /// status is an idempotent duplicate and a different terminal status is a conflict.
    pub fn transition(self, next: CallStatus) -> Result<Transition, CallTransitionError> {
        if self.is_terminal() {
            if next == self {
                return Ok(Transition::DuplicateTerminal);
            }
            if next.is_terminal() {
                return Err(CallTransitionError::TerminalStateConflict {
                    current: self,
                    attempted: next,
                });
            }
            return Ok(Transition::Stale { current: self, reported: next });
        }

        if next.is_terminal() {
            return Ok(Transition::Terminated { from: self, to: next });
        }
        if next == self {
            return Ok(Transition::Unchanged);
        }
        if next.progress_rank() > self.progress_rank() {
            Ok(Transition::Advanced { from: self, to: next })
        } else {
            Ok(Transition::Stale { current: self, reported: next })
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub id: CallSessionId,
    pub public_id: PublicCallId,
    pub trace_id: String,
    pub carrier_call_id: CarrierCallId,
    pub from_number: String,
    pub to_number: String,
    pub campaign_id: CampaignId,
    pub supplier_id: SupplierId,
    pub buyer_id: Option<BuyerId>,
    pub offer_id: Option<OfferId>,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub billable_duration_seconds: Option<i64>,
    pub telephony_cost_cents: Option<i64>,
    pub revenue_estimated_cents: i64,
}

impl CallSession {
    /// Fresh session in [`CallStatus::Initiated`] with no route and zero revenue.
    pub fn initiated(new: NewCallSession) -> Self {
        Self {
            id: new.id,
            public_id: new.public_id,
            trace_id: new.trace_id,
            carrier_call_id: new.carrier_call_id,
            from_number: new.from_number,
            to_number: new.to_number,
            campaign_id: new.campaign_id,
            supplier_id: new.supplier_id,
            buyer_id: None,
            offer_id: None,
            status: CallStatus::Initiated,
            created_at: new.created_at,
            answered_at: None,
            ended_at: None,
            duration_seconds: None,
            billable_duration_seconds: None,
            telephony_cost_cents: None,
            revenue_estimated_cents: 0,
        }
    }

    pub fn is_routed(&self) -> bool {
        self.buyer_id.is_some() && self.offer_id.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCallSession {
    pub id: CallSessionId,
    pub public_id: PublicCallId,
    pub trace_id: String,
    pub carrier_call_id: CarrierCallId,
    pub from_number: String,
    pub to_number: String,
    pub campaign_id: CampaignId,
    pub supplier_id: SupplierId,
    pub created_at: DateTime<Utc>,
}

/// Final lifecycle and economics fields written once, on the first terminal status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedCall {
    pub status: CallStatus,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub billable_duration_seconds: i64,
    pub telephony_cost_cents: i64,
    pub revenue_estimated_cents: i64,
}
