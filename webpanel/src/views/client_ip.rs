//! Client address extraction.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Address the request came from: the `X-Forwarded-For` header as sent, else the peer address,
/// else `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty());
        if let Some(forwarded) = forwarded {
            return Ok(ClientIp(forwarded.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientIp(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}
