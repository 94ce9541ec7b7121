//! Session cookie encoding.
//!
//! The cookie value is the session id, or `{sid}.{signature}` when signing is enabled, where the
//! signature is the URL-safe base64 HMAC-SHA256 of the id under the application secret key.

use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::prelude::RngExt;
use rand::rng;
use sha2::Sha256;

use crate::config::SessionConfig;

type HmacSha256 = Hmac<Sha256>;

const MAX_SESSION_ID_LEN: usize = 128;

/// Generate a new session id: 32 random bytes, URL-safe base64 without padding.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Whether `sid` could have been produced by [`generate_session_id`].
pub fn is_valid_session_id(sid: &str) -> bool {
    !sid.is_empty()
        && sid.len() <= MAX_SESSION_ID_LEN
        && sid.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn mac(secret: &[u8]) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret).ok()
}

pub fn sign(sid: &str, secret: &[u8]) -> Option<String> {
    let mut mac = mac(secret)?;
    mac.update(sid.as_bytes());
    let signature = mac.finalize().into_bytes();
    Some(format!("{sid}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Return the session id of a signed cookie value if the signature matches.
pub fn unsign(value: &str, secret: &[u8]) -> Option<String> {
    let (sid, signature) = value.rsplit_once('.')?;
    if !is_valid_session_id(sid) {
        return None;
    }
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

    let mut mac = mac(secret)?;
    mac.update(sid.as_bytes());
    // Constant-time comparison
    mac.verify_slice(&signature).ok()?;
    Some(sid.to_string())
}

/// Find cookie `name` in the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// Extract the session id from the request cookie, checking the signature when configured.
pub fn session_id_from_headers(headers: &HeaderMap, config: &SessionConfig, secret: &[u8]) -> Option<String> {
    let value = read_cookie(headers, &config.cookie_name)?;
    if config.use_signer {
        unsign(&value, secret)
    } else {
        is_valid_session_id(&value).then_some(value)
    }
}

fn attributes(config: &SessionConfig) -> String {
    let mut attrs = format!("; Path={}", config.cookie_path);
    if let Some(domain) = &config.cookie_domain {
        attrs.push_str(&format!("; Domain={domain}"));
    }
    if config.cookie_http_only {
        attrs.push_str("; HttpOnly");
    }
    if config.cookie_secure {
        attrs.push_str("; Secure");
    }
    attrs.push_str(&format!("; SameSite={}", config.cookie_same_site.as_str()));
    attrs
}

/// `Set-Cookie` value carrying the session id.
pub fn session_cookie(sid: &str, config: &SessionConfig, secret: &[u8]) -> Option<String> {
    let value = if config.use_signer {
        sign(sid, secret)?
    } else {
        sid.to_string()
    };

    let mut cookie = format!("{}={}{}", config.cookie_name, value, attributes(config));
    if config.permanent {
        cookie.push_str(&format!("; Max-Age={}", config.lifetime.as_secs()));
    }
    Some(cookie)
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn expired_cookie(config: &SessionConfig) -> String {
    format!("{}={}; Max-Age=0", config.cookie_name, attributes(config))
}
