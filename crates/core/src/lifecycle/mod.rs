//! Call session lifecycle: open, route, progress, seal, convert.
//!
//! All status changes go through [`CallStatus::transition`]; the store only ever sees
//! conditional writes, so concurrent carrier retries for the same call cannot both win.

pub mod intake;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::call::{
    CallSession, CallSessionId, CallStatus, CallTransitionError, CarrierCallId, NewCallSession,
    PublicCallId, SealedCall, Transition,
};
use crate::domain::campaign::{CampaignId, SupplierId};
use crate::domain::conversion::{ConversionEvent, ConversionEventId, ConversionReport};
use crate::domain::number::TrackingNumber;
use crate::economics::{default_cost_per_minute_cents, CallEconomics, OfferTerms};
use crate::errors::{ApplicationError, DomainError};
use crate::routing::RoutingDecision;
use crate::store::{CallSessionStore, OfferCatalog, StoreError};

pub use intake::{handle_inbound_call, CallRoute};

/// An inbound call after its dialed number has been resolved to a campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundCall {
    pub carrier_call_id: CarrierCallId,
    pub from_number: String,
    pub to_number: String,
    pub campaign_id: CampaignId,
    pub supplier_id: SupplierId,
}

impl InboundCall {
    pub fn for_number(
        carrier_call_id: CarrierCallId,
        from_number: impl Into<String>,
        number: &TrackingNumber,
    ) -> Self {
        Self {
            carrier_call_id,
            from_number: from_number.into(),
            to_number: number.e164.clone(),
            campaign_id: number.campaign_id.clone(),
            supplier_id: number.supplier_id.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalOutcome {
    /// First terminal status; economics were computed and persisted.
    Sealed(CallEconomics),
    /// Same terminal status delivered again. Nothing was written.
    Duplicate,
    /// A different terminal status arrived after the session ended; the first one stands.
    Conflict { kept: CallStatus, rejected: CallStatus },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusOutcome {
    Advanced(CallStatus),
    /// Re-delivery, stale ordering, or a lost race against a concurrent update.
    Ignored,
    Terminal(TerminalOutcome),
    UnknownCall,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionRejection {
    CallNotFound,
    BuyerMismatch,
    NegativeRevenue,
}

impl ConversionRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallNotFound => "call_not_found",
            Self::BuyerMismatch => "buyer_mismatch",
            Self::NegativeRevenue => "negative_revenue",
        }
    }

    pub fn into_error(self, report: &ConversionReport) -> ApplicationError {
        match self {
            Self::CallNotFound => ApplicationError::NotFound(format!(
                "call session `{}`",
                report.call_public_id.0
            )),
            Self::BuyerMismatch => DomainError::ConversionBuyerMismatch {
                call_public_id: report.call_public_id.0.clone(),
                reported_buyer_id: report.buyer_id.0.clone(),
            }
            .into(),
            Self::NegativeRevenue => DomainError::InvariantViolation(
                "revenue_cents must not be negative".to_owned(),
            )
            .into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversionOutcome {
    Accepted {
        event_id: ConversionEventId,
        call_session_id: CallSessionId,
        revenue_estimated_cents: i64,
    },
    Rejected(ConversionRejection),
}

pub struct CallLifecycle {
    sessions: Arc<dyn CallSessionStore>,
    catalog: Arc<dyn OfferCatalog>,
    cost_per_minute_cents: Decimal,
    timeout: Duration,
}

impl CallLifecycle {
    pub fn new(sessions: Arc<dyn CallSessionStore>, catalog: Arc<dyn OfferCatalog>) -> Self {
        Self {
            sessions,
            catalog,
            cost_per_minute_cents: default_cost_per_minute_cents(),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_cost_per_minute(mut self, cost_per_minute_cents: Decimal) -> Self {
        self.cost_per_minute_cents = cost_per_minute_cents;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Looks up an active tracking number for the dialed DID.
    pub async fn resolve_number(
        &self,
        to_number: &str,
    ) -> Result<Option<TrackingNumber>, ApplicationError> {
        let number = self.bounded(self.catalog.find_tracking_number(to_number)).await?;
        Ok(number.filter(|number| number.status.is_active()))
    }

    pub async fn open_session(&self, call: InboundCall) -> Result<CallSession, ApplicationError> {
        let new = NewCallSession {
            id: CallSessionId(Uuid::new_v4().to_string()),
            public_id: PublicCallId(Uuid::new_v4().to_string()),
            trace_id: Uuid::new_v4().to_string(),
            carrier_call_id: call.carrier_call_id,
            from_number: call.from_number,
            to_number: call.to_number,
            campaign_id: call.campaign_id,
            supplier_id: call.supplier_id,
            created_at: Utc::now(),
        };

        let upsert = self.bounded(self.sessions.create_or_fetch(new)).await?;
        let session = upsert.session;
        if upsert.created {
            info!(
                event_name = "call_session.created",
                trace_id = %session.trace_id,
                call_session_id = %session.id.0,
                carrier_call_id = %session.carrier_call_id.0,
                campaign_id = %session.campaign_id.0,
                "call session created"
            );
        } else {
            info!(
                event_name = "call_session.duplicate_carrier_call_id",
                trace_id = %session.trace_id,
                call_session_id = %session.id.0,
                carrier_call_id = %session.carrier_call_id.0,
                "carrier retried call creation; reusing existing session"
            );
        }
        Ok(session)
    }

    pub async fn attach_route(
        &self,
        session: &CallSession,
        decision: &RoutingDecision,
    ) -> Result<(), ApplicationError> {
        self.bounded(self.sessions.attach_route(
            &session.id,
            &decision.buyer_id,
            &decision.offer_id,
        ))
        .await?;
        info!(
            event_name = "call_session.routed",
            trace_id = %session.trace_id,
            call_session_id = %session.id.0,
            buyer_id = %decision.buyer_id.0,
            offer_id = %decision.offer_id.0,
            "route attached to call session"
        );
        Ok(())
    }

    /// Entry point for carrier status callbacks.
    pub async fn record_carrier_status(
        &self,
        carrier_call_id: &CarrierCallId,
        raw_status: &str,
        duration_seconds: Option<i64>,
    ) -> Result<StatusOutcome, ApplicationError> {
        let Some(session) =
            self.bounded(self.sessions.find_by_carrier_call_id(carrier_call_id)).await?
        else {
            warn!(
                event_name = "call_session.not_found_for_status",
                carrier_call_id = %carrier_call_id.0,
                raw_status,
                "status callback for unknown call"
            );
            return Ok(StatusOutcome::UnknownCall);
        };

        let reported = CallStatus::from_carrier(raw_status);
        if reported.is_terminal() {
            let outcome =
                self.record_call_terminal(&session.id, reported, duration_seconds.unwrap_or(0))
                    .await?;
            return Ok(StatusOutcome::Terminal(outcome));
        }

        match session.status.transition(reported) {
            Ok(Transition::Advanced { from, to }) => {
                let advanced = self
                    .bounded(self.sessions.advance_status(&session.id, from, to, Utc::now()))
                    .await?;
                if advanced {
                    info!(
                        event_name = "call_session.status.advanced",
                        trace_id = %session.trace_id,
                        call_session_id = %session.id.0,
                        from = from.as_str(),
                        to = to.as_str(),
                        "call status advanced"
                    );
                    Ok(StatusOutcome::Advanced(to))
                } else {
                    Ok(StatusOutcome::Ignored)
                }
            }
            Ok(_) | Err(_) => {
                info!(
                    event_name = "call_session.status.ignored",
                    trace_id = %session.trace_id,
                    call_session_id = %session.id.0,
                    current = session.status.as_str(),
                    reported = reported.as_str(),
                    "status callback did not move the call forward"
                );
                Ok(StatusOutcome::Ignored)
            }
        }
    }

    /// Applies a terminal carrier status exactly once per session.
    pub async fn record_call_terminal(
        &self,
        call_session_id: &CallSessionId,
        carrier_status: CallStatus,
        duration_seconds: i64,
    ) -> Result<TerminalOutcome, ApplicationError> {
        if !carrier_status.is_terminal() {
            return Err(DomainError::NonTerminalStatus(carrier_status).into());
        }

        let session = self.load_session(call_session_id).await?;
        match session.status.transition(carrier_status) {
            Ok(Transition::Terminated { to, .. }) => {
                self.seal(&session, to, duration_seconds, Utc::now()).await
            }
            Ok(Transition::DuplicateTerminal) => {
                info!(
                    event_name = "call_session.terminal.duplicate",
                    trace_id = %session.trace_id,
                    call_session_id = %session.id.0,
                    status = carrier_status.as_str(),
                    "terminal status re-delivered"
                );
                Ok(TerminalOutcome::Duplicate)
            }
            Ok(other) => Err(DomainError::InvariantViolation(format!(
                "terminal status {carrier_status:?} produced non-terminal transition {other:?}"
            ))
            .into()),
            Err(error) => Ok(self.conflict(&session, error)),
        }
    }

    pub async fn apply_conversion(
        &self,
        report: ConversionReport,
    ) -> Result<ConversionOutcome, ApplicationError> {
        if report.revenue_cents.is_some_and(|revenue| revenue < 0) {
            return Ok(ConversionOutcome::Rejected(ConversionRejection::NegativeRevenue));
        }

        let Some(session) =
            self.bounded(self.sessions.find_by_public_id(&report.call_public_id)).await?
        else {
            return Ok(ConversionOutcome::Rejected(ConversionRejection::CallNotFound));
        };

        if session.buyer_id.as_ref() != Some(&report.buyer_id) {
            let routed_buyer_id = session.buyer_id.as_ref().map_or("none", |id| id.0.as_str());
            warn!(
                event_name = "conversion.buyer_mismatch",
                trace_id = %session.trace_id,
                call_session_id = %session.id.0,
                reported_buyer_id = %report.buyer_id.0,
                routed_buyer_id,
                "conversion rejected"
            );
            return Ok(ConversionOutcome::Rejected(ConversionRejection::BuyerMismatch));
        }

        let event = ConversionEvent {
            id: ConversionEventId(Uuid::new_v4().to_string()),
            call_session_id: session.id.clone(),
            buyer_id: report.buyer_id,
            event_type: report.event_type,
            event_time: report.event_time,
            revenue_cents: report.revenue_cents,
            source: report.source,
            created_at: Utc::now(),
        };
        let write = self.bounded(self.sessions.append_conversion(&event)).await?;

        info!(
            event_name = "conversion.recorded",
            trace_id = %session.trace_id,
            call_session_id = %session.id.0,
            conversion_id = %event.id.0,
            event_type = %event.event_type,
            revenue_estimated_cents = write.revenue_estimated_cents,
            raised = write.raised,
            "conversion recorded"
        );

        Ok(ConversionOutcome::Accepted {
            event_id: event.id,
            call_session_id: session.id,
            revenue_estimated_cents: write.revenue_estimated_cents,
        })
    }

    async fn seal(
        &self,
        session: &CallSession,
        status: CallStatus,
        duration_seconds: i64,
        ended_at: DateTime<Utc>,
    ) -> Result<TerminalOutcome, ApplicationError> {
        let terms = self.offer_terms(session).await?;
        let economics =
            CallEconomics::compute(duration_seconds, terms.as_ref(), self.cost_per_minute_cents);
        let sealed = SealedCall {
            status,
            ended_at,
            duration_seconds: economics.duration_seconds,
            billable_duration_seconds: economics.duration_seconds,
            telephony_cost_cents: economics.telephony_cost_cents,
            revenue_estimated_cents: economics.revenue_estimated_cents,
        };

        if self.bounded(self.sessions.seal_terminal(&session.id, &sealed)).await? {
            info!(
                event_name = "call_session.economics.sealed",
                trace_id = %session.trace_id,
                call_session_id = %session.id.0,
                status = status.as_str(),
                duration_seconds = economics.duration_seconds,
                billed_minutes = economics.billed_minutes,
                telephony_cost_cents = economics.telephony_cost_cents,
                revenue_estimated_cents = economics.revenue_estimated_cents,
                "call session sealed"
            );
            return Ok(TerminalOutcome::Sealed(economics));
        }

        // A concurrent delivery sealed the session first; report against what it wrote.
        let current = self.load_session(&session.id).await?;
        match current.status.transition(status) {
            Ok(Transition::DuplicateTerminal) => Ok(TerminalOutcome::Duplicate),
            Err(error) => Ok(self.conflict(&current, error)),
            Ok(other) => Err(DomainError::InvariantViolation(format!(
                "conditional seal lost but session reports {other:?}"
            ))
            .into()),
        }
    }

    async fn offer_terms(
        &self,
        session: &CallSession,
    ) -> Result<Option<OfferTerms>, ApplicationError> {
        let Some(offer_id) = &session.offer_id else {
            info!(
                event_name = "call_session.economics.offer_missing",
                trace_id = %session.trace_id,
                call_session_id = %session.id.0,
                "no offer attached; revenue will be zero"
            );
            return Ok(None);
        };
        let offer = self.bounded(self.catalog.find_offer(offer_id)).await?;
        Ok(offer.map(|offer| offer.terms()))
    }

    fn conflict(&self, session: &CallSession, error: CallTransitionError) -> TerminalOutcome {
        let CallTransitionError::TerminalStateConflict { current, attempted } = error;
        warn!(
            event_name = "call_session.terminal.conflict",
            trace_id = %session.trace_id,
            call_session_id = %session.id.0,
            kept = current.as_str(),
            rejected = attempted.as_str(),
            "second terminal status ignored"
        );
        TerminalOutcome::Conflict { kept: current, rejected: attempted }
    }

    async fn load_session(&self, id: &CallSessionId) -> Result<CallSession, ApplicationError> {
        self.bounded(self.sessions.find_by_id(id))
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("call session `{}`", id.0)))
    }

    pub async fn find_by_public_id(
        &self,
        public_id: &PublicCallId,
    ) -> Result<Option<CallSession>, ApplicationError> {
        Ok(self.bounded(self.sessions.find_by_public_id(public_id)).await?)
    }

    async fn bounded<T, F>(&self, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, future).await.map_err(|_| StoreError::Timeout)?
    }
}
