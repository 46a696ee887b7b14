//! Minimal TwiML rendering for the two answers the voice webhook ever gives:
//! bridge the caller to a buyer, or speak a message and hang up.

use axum::{
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use dcx_core::routing::DestinationType;
use dcx_core::RoutingDecision;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const STATUS_EVENTS: &str = "initiated ringing answered completed";

/// `<Dial>` bridging to the routed buyer.
///
/// The dial `action` reports the bridged leg's final `DialCallStatus` and
/// `DialCallDuration`; the noun-level callback streams progress events.
pub fn dial(decision: &RoutingDecision, status_callback: &str) -> String {
    let callback = escape(status_callback);
    let noun = match decision.destination_type {
        DestinationType::PhoneNumber => "Number",
        DestinationType::Sip => "Sip",
    };
    format!(
        "{XML_HEADER}<Response><Dial timeout=\"{ring}\" timeLimit=\"{limit}\" \
         action=\"{callback}\" method=\"POST\"><{noun} statusCallback=\"{callback}\" \
         statusCallbackMethod=\"POST\" statusCallbackEvent=\"{STATUS_EVENTS}\">{destination}\
         </{noun}></Dial></Response>",
        ring = decision.max_ring_seconds,
        limit = decision.max_call_duration_seconds,
        destination = escape(&decision.destination_value),
    )
}

pub fn say(voice: &str, message: &str) -> String {
    format!(
        "{XML_HEADER}<Response><Say voice=\"{}\">{}</Say></Response>",
        escape(voice),
        escape(message)
    )
}

/// Acknowledgement for status callbacks; an empty response ends the call flow.
pub fn empty() -> String {
    format!("{XML_HEADER}<Response></Response>")
}

pub fn into_response(document: String) -> Response {
    ([(CONTENT_TYPE, "text/xml; charset=utf-8")], document).into_response()
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
