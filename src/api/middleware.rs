//! API Middleware
//!
//! Caller identity and request logging.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::{OperationContext, UserId};
use crate::error::AppError;

/// Header carrying the subject verified by the upstream identity provider
pub const REQUEST_USER_HEADER: &str = "x-request-user-id";

/// Header carrying the correlation id (read from requests, echoed on responses)
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request user from X-Request-User-Id header
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub user_id: UserId,
}

// =========================================================================
// Identity Middleware
// =========================================================================

/// Require X-Request-User-Id and build the operation context.
///
/// The gateway in front of this service has already authenticated the
/// caller; this layer only refuses requests that arrive without a subject.
pub async fn identity_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers();

    let raw_user = match headers.get(REQUEST_USER_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| AppError::InvalidRequest("X-Request-User-Id is not valid UTF-8".into()))?,
        None => return Err(AppError::Unauthenticated),
    };
    if raw_user.trim().is_empty() {
        return Err(AppError::Unauthenticated);
    }
    let user_id = UserId::parse(raw_user)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid X-Request-User-Id: {}", e)))?;

    // Extract correlation ID or generate new one
    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new()
        .with_request_user(user_id.clone())
        .with_correlation_id(correlation_id);
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        context = context.with_client_ip(addr.ip());
    }

    request.extensions_mut().insert(RequestUser { user_id });
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    Ok(response)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "idempotency-key"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Logs each request on the way in and its outcome on the way out.
/// Server errors are logged at warn.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let headers = mask_headers_for_logging(request.headers());
    let start = std::time::Instant::now();

    tracing::debug!(method = %method, path = %path, headers = ?headers, "Incoming request");

    let response = next.run(request).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status();
    let correlation_id = response
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms,
            correlation_id,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms,
            correlation_id,
            "Request completed"
        );
    }

    response
}
