//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, rejection::QueryRejection},
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, Balance, OperationContext, TransferRecord, UserId};
use crate::engine::TransferCommand;
use crate::error::{AppError, AppResult};
use crate::history::HistoryEntry;
use crate::identity::IdentityResolver;
use crate::store::{AccountStore, LedgerStore, StoreError};

use super::middleware::RequestUser;
use super::state::AppState;

/// Request header carrying the optional idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Balance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Transfer request body. The sender is always the authenticated caller.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferRequest {
    pub to: String,
    /// JSON number or decimal string
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub transfer_id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Amount,
    pub status: String,
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: UserId,
    pub transactions: Vec<HistoryEntry>,
}

// =========================================================================
// API Router
// =========================================================================

/// Routes mounted under `/api/v1`; all of them require a caller identity.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/account/balance", get(get_balance))
        .route("/account/transfer", post(transfer))
        .route("/account/transactions", get(list_transactions))
        .route("/transfers/:transfer_id", get(get_transfer))
}

// =========================================================================
// Handlers
// =========================================================================

async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
) -> AppResult<Json<BalanceResponse>> {
    let balance = state
        .storage
        .get_balance(&user.user_id)
        .await
        .map_err(|e| match e {
            StoreError::AccountNotFound(id) => AppError::AccountNotFound(id.to_string()),
            other => AppError::Store(other),
        })?;

    let display_name = match state.resolver.resolve_display_name(&user.user_id).await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(user_id = %user.user_id, error = %e, "Display name lookup failed");
            None
        }
    };

    Ok(Json(BalanceResponse {
        user_id: user.user_id,
        balance,
        display_name,
    }))
}

async fn transfer(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TransferResponse>)> {
    let Json(request) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let mut command = TransferCommand::new(user.user_id, request.to, request.amount);
    if let Some(note) = request.note {
        command = command.with_note(note);
    }
    if let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = value
            .to_str()
            .map_err(|_| AppError::InvalidRequest("Idempotency-Key is not valid UTF-8".into()))?;
        command = command.with_idempotency_key(key);
    }

    let result = state.engine.transfer(command, &context).await?;

    let status = if result.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(TransferResponse {
            transfer_id: result.transfer_id,
            sender_id: result.sender_id,
            receiver_id: result.receiver_id,
            amount: result.amount,
            status: result.status,
            replayed: result.replayed,
        }),
    ))
}

async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> AppResult<Json<HistoryResponse>> {
    let Query(params) = params.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let transactions = state.history.history(&user.user_id, params.limit).await?;

    Ok(Json(HistoryResponse {
        user_id: user.user_id,
        transactions,
    }))
}

async fn get_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    transfer_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<TransferRecord>> {
    let Path(transfer_id) = transfer_id.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    // Non-participants get the same answer as for a missing id
    match state.storage.get_transfer(transfer_id).await? {
        Some(record) if record.involves(&user.user_id) => Ok(Json(record)),
        _ => Err(AppError::TransferNotFound(transfer_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer_request_deserialize() {
        let json = r#"{ "to": "bob", "amount": "100.50", "note": "Test payment" }"#;

        let request: TransferRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.to, "bob");
        assert_eq!(request.amount, dec!(100.50));
        assert_eq!(request.note, Some("Test payment".to_string()));
    }

    #[test]
    fn test_transfer_request_accepts_numeric_amount() {
        let request: TransferRequest =
            serde_json::from_str(r#"{ "to": "bob", "amount": 200 }"#).unwrap();
        assert_eq!(request.amount, dec!(200));
        assert!(request.note.is_none());
    }

    #[test]
    fn test_transfer_request_rejects_unknown_fields() {
        let json = r#"{ "to": "bob", "amount": 5, "from": "alice" }"#;
        assert!(serde_json::from_str::<TransferRequest>(json).is_err());
    }

    #[test]
    fn test_transfer_request_requires_amount() {
        assert!(serde_json::from_str::<TransferRequest>(r#"{ "to": "bob" }"#).is_err());
    }
}
