//! Request extractors.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use ecosort_core::auth::credential_from_headers;

use crate::state::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Who is calling: the presented credential and the peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub credential: Option<String>,
    /// Client address, or `"unknown"` when the transport does not report one.
    pub peer: String,
}

impl FromRequestParts<AppState> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

        let credential = credential_from_headers(
            header(API_KEY_HEADER),
            header(AUTHORIZATION.as_str()),
        )
        .map(str::to_string);

        let forwarded = if state.trust_forwarded_for {
            header(FORWARDED_FOR_HEADER).and_then(first_forwarded_ip)
        } else {
            None
        };

        let peer = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self { credential, peer })
    }
}

fn first_forwarded_ip(value: &str) -> Option<IpAddr> {
    value.split(',').next()?.trim().parse().ok()
}
