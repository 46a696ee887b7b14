use std::collections::BTreeMap;

use axum::http::{HeaderMap, Uri};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Carrier request signature: base64(HMAC-SHA1(auth_token, url + k1 + v1 + k2 + v2 ...))
/// with form parameters concatenated in key order.
#[cfg(test)]
pub fn sign(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(signing_payload(url, params).as_bytes());
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of the provided header value against the expected tag.
pub fn verify(
    auth_token: &str,
    url: &str,
    params: &BTreeMap<String, String>,
    provided: &str,
) -> bool {
    let Ok(provided) = STANDARD.decode(provided.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(signing_payload(url, params).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

fn signing_payload(url: &str, params: &BTreeMap<String, String>) -> String {
    let mut payload = String::from(url);
    for (key, value) in params {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload
}

/// Rebuilds the URL the carrier signed.
///
/// A configured public base URL wins. Otherwise scheme and host come from the
/// request, honoring `x-forwarded-proto` when a proxy terminates TLS in front of us.
pub fn request_url(public_base_url: Option<&str>, headers: &HeaderMap, uri: &Uri) -> String {
    let path = uri.path_and_query().map_or("/", |path| path.as_str());
    match public_base_url {
        Some(base) => format!("{}{path}", base.trim_end_matches('/')),
        None => format!("{}{path}", origin(headers)),
    }
}

/// `scheme://host` as seen by the caller.
pub fn origin(headers: &HeaderMap) -> String {
    let proto = header_str(headers, "x-forwarded-proto")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .unwrap_or("http");
    let host = header_str(headers, "x-forwarded-host")
        .or_else(|| header_str(headers, "host"))
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok()).filter(|value| !value.is_empty())
}
