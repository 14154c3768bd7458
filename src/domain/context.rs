//! Operation Context
//!
//! Who asked for an operation and how to find its log lines again.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::UserId;

/// Request metadata carried from the HTTP edge into the engine.
///
/// Every context has a correlation id; one is generated when the caller did
/// not supply it.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Subject asserted by the upstream gateway, if any
    pub request_user_id: Option<UserId>,
    pub correlation_id: Uuid,
    pub client_ip: Option<IpAddr>,
    pub received_at: DateTime<Utc>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self {
            request_user_id: None,
            correlation_id: Uuid::new_v4(),
            client_ip: None,
            received_at: Utc::now(),
        }
    }
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_user(mut self, user_id: UserId) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Whether `user_id` may act as this caller. Contexts without a request
    /// user (internal callers, load tests) may act for anyone.
    pub fn may_act_as(&self, user_id: &UserId) -> bool {
        self.request_user_id
            .as_ref()
            .map_or(true, |caller| caller == user_id)
    }

    /// Span for every log line emitted while serving this operation
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "operation",
            operation,
            correlation_id = %self.correlation_id,
            caller = ?self.request_user_id.as_ref().map(UserId::as_str),
        )
    }
}
