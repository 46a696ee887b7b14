pub mod caps;
pub mod config;
pub mod domain;
pub mod economics;
pub mod errors;
pub mod lifecycle;
pub mod routing;
pub mod store;

#[cfg(test)]
mod testing;

pub use caps::{BuyerCaps, CapLedger, CapReservation, CapViolation};
pub use domain::buyer::{Buyer, BuyerId, EndpointType};
pub use domain::call::{CallSession, CallSessionId, CallStatus, CarrierCallId, PublicCallId};
pub use domain::campaign::{CampaignId, SupplierId};
pub use domain::conversion::{ConversionEvent, ConversionReport, ConversionSource};
pub use domain::offer::{Offer, OfferId};
pub use economics::{CallEconomics, OfferTerms};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    handle_inbound_call, CallLifecycle, CallRoute, ConversionOutcome, ConversionRejection,
    InboundCall, StatusOutcome, TerminalOutcome,
};
pub use routing::{
    NoRouteReason, RoutingDecision, RoutingEngine, RoutingOutcome, RoutingPolicy, RoutingRequest,
};
pub use store::{CallSessionStore, CapLedgerStore, OfferCatalog, StoreError};
