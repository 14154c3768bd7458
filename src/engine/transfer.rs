//! Transfer Engine
//!
//! Orchestrates one transfer: validates the command, checks sender funds and
//! receiver existence, then debits, credits and appends the ledger record
//! inside a single atomic scope. Every failure leaves no trace in either
//! store.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{
    Amount, NewTransfer, Note, OperationContext, TransferError, TransferRecord, UserId,
};
use crate::idempotency::{request_fingerprint, IdempotencyKey};
use crate::identity::IdentityResolver;
use crate::store::{AtomicScope, Storage, StoreError, StoreResult};

use super::{TransferCommand, TransferResult, TransferState};

/// Base delay between conflict retries, multiplied by the attempt number
const RETRY_BACKOFF_MS: u64 = 10;

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Deadline applied when the command carries none
    pub default_deadline: Duration,
    /// How many times Reserving is retried after a commit conflict
    pub conflict_retries: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_millis(5000),
            conflict_retries: 1,
        }
    }
}

// =========================================================================
// TransferEngine
// =========================================================================

/// Executes transfers against injected store and resolver handles
pub struct TransferEngine {
    storage: Arc<dyn Storage>,
    resolver: Arc<dyn IdentityResolver>,
    options: EngineOptions,
}

/// A command that passed validation
struct ValidatedTransfer {
    transfer_id: Uuid,
    sender_id: UserId,
    receiver_id: UserId,
    amount: Amount,
    note: Note,
    idempotency_key: Option<IdempotencyKey>,
    request_hash: String,
    deadline: Duration,
}

impl ValidatedTransfer {
    fn to_new_transfer(&self, sender_name: &str, receiver_name: &str) -> NewTransfer {
        NewTransfer {
            id: self.transfer_id,
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            amount: self.amount,
            note: self.note.clone(),
            sender_name: sender_name.to_string(),
            receiver_name: receiver_name.to_string(),
            idempotency_key: self.idempotency_key.as_ref().map(|key| key.to_string()),
            request_hash: Some(self.request_hash.clone()),
        }
    }
}

/// Tracks the FSM state of one call
struct Progress {
    transfer_id: Uuid,
    state: TransferState,
}

impl Progress {
    fn new(transfer_id: Uuid) -> Self {
        Self {
            transfer_id,
            state: TransferState::Validating,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transfer transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            transfer_id = %self.transfer_id,
            from = %self.state,
            to = %next,
            "Transfer state change"
        );
        self.state = next;
    }

    fn fail(&mut self, err: &TransferError) {
        if err.is_client_error() {
            self.advance(TransferState::Rejected);
        } else {
            self.advance(TransferState::Aborted);
        }
    }
}

impl TransferEngine {
    pub fn new(storage: Arc<dyn Storage>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            storage,
            resolver,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Execute a transfer.
    ///
    /// On success the returned id names a record that is already durable
    /// together with both balance changes. On any error nothing was applied.
    pub async fn transfer(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> Result<TransferResult, TransferError> {
        let transfer_id = Uuid::new_v4();
        let mut progress = Progress::new(transfer_id);

        let request = match self.validate(transfer_id, command, context) {
            Ok(request) => request,
            Err(e) => {
                progress.fail(&e);
                tracing::info!(
                    transfer_id = %transfer_id,
                    correlation_id = %context.correlation_id,
                    error = %e,
                    "Transfer rejected"
                );
                return Err(e);
            }
        };

        let deadline = request.deadline;
        let execution = self
            .execute(&request, &mut progress)
            .instrument(context.span("transfer"));
        let outcome = match tokio::time::timeout(deadline, execution).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransferError::aborted(format!(
                "deadline of {}ms exceeded",
                deadline.as_millis()
            ))),
        };

        match &outcome {
            Ok(result) => {
                progress.advance(TransferState::Done);
                tracing::info!(
                    transfer_id = %result.transfer_id,
                    correlation_id = %context.correlation_id,
                    sender = %result.sender_id,
                    receiver = %result.receiver_id,
                    amount = result.amount.units(),
                    replayed = result.replayed,
                    "Transfer completed"
                );
            }
            Err(e) => {
                progress.fail(e);
                if e.is_client_error() {
                    tracing::info!(
                        transfer_id = %transfer_id,
                        correlation_id = %context.correlation_id,
                        error = %e,
                        "Transfer rejected"
                    );
                } else {
                    tracing::warn!(
                        transfer_id = %transfer_id,
                        correlation_id = %context.correlation_id,
                        error = %e,
                        "Transfer aborted"
                    );
                }
            }
        }

        outcome
    }

    // =========================================================================
    // Validating
    // =========================================================================

    fn validate(
        &self,
        transfer_id: Uuid,
        command: TransferCommand,
        context: &OperationContext,
    ) -> Result<ValidatedTransfer, TransferError> {
        if !context.may_act_as(&command.sender_id) {
            return Err(TransferError::invalid(
                "Sender does not match the authenticated user",
            ));
        }

        let receiver = command.receiver_id.trim();
        if receiver.is_empty() {
            return Err(TransferError::invalid("Recipient is required"));
        }
        let receiver_id = UserId::parse(receiver)
            .map_err(|e| TransferError::invalid(format!("Invalid recipient: {}", e)))?;

        let amount = Amount::from_decimal_floor(command.amount)
            .map_err(|e| TransferError::invalid(format!("Invalid amount: {}", e)))?;

        if receiver_id == command.sender_id {
            return Err(TransferError::invalid("Cannot transfer to the same account"));
        }

        let note = Note::new(command.note.unwrap_or_default()).map_err(TransferError::invalid)?;

        let idempotency_key = command
            .idempotency_key
            .as_deref()
            .map(IdempotencyKey::parse)
            .transpose()
            .map_err(|e| TransferError::invalid(e.to_string()))?;

        let request_hash = request_fingerprint(&receiver_id, &amount, &note);

        Ok(ValidatedTransfer {
            transfer_id,
            sender_id: command.sender_id,
            receiver_id,
            amount,
            note,
            idempotency_key,
            request_hash,
            deadline: command.deadline.unwrap_or(self.options.default_deadline),
        })
    }

    /// Everything after validation; runs under the deadline.
    async fn execute(
        &self,
        request: &ValidatedTransfer,
        progress: &mut Progress,
    ) -> Result<TransferResult, TransferError> {
        if let Some(replay) = self.find_replay(request).await? {
            return Ok(replay);
        }

        let (sender_name, receiver_name) = self.snapshot_names(request).await;

        let mut attempt: u32 = 0;
        loop {
            // A same-key duplicate may have committed while we were racing it
            if attempt > 0 {
                if let Some(replay) = self.find_replay(request).await? {
                    return Ok(replay);
                }
            }

            progress.advance(TransferState::Reserving);
            if let Err(e) = self.reserve(request).await {
                return self.replay_or(request, e).await;
            }

            progress.advance(TransferState::Committing);
            match self.commit(request, &sender_name, &receiver_name).await {
                Ok(record) => return Ok(TransferResult::from_record(&record, false)),
                Err(e) if e.is_conflict() && attempt < self.options.conflict_retries => {
                    attempt += 1;
                    tracing::warn!(
                        transfer_id = %request.transfer_id,
                        attempt,
                        max_retries = self.options.conflict_retries,
                        error = %e,
                        "Commit conflict, retrying reservation"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
                Err(StoreError::DuplicateIdempotencyKey(key)) => {
                    // A concurrent request with the same key committed first
                    return match self.find_replay(request).await? {
                        Some(replay) => Ok(replay),
                        None => Err(TransferError::aborted(format!(
                            "idempotency key {} is held by an unreadable transfer",
                            key
                        ))),
                    };
                }
                Err(e) => {
                    let err = map_commit_error(request, e);
                    return self.replay_or(request, err).await;
                }
            }
        }
    }

    /// A keyed request that finds the sender drained may have lost to its own
    /// duplicate; answer with the winner's record in that case.
    async fn replay_or(
        &self,
        request: &ValidatedTransfer,
        err: TransferError,
    ) -> Result<TransferResult, TransferError> {
        if matches!(err, TransferError::InsufficientFunds { .. }) {
            if let Some(replay) = self.find_replay(request).await? {
                return Ok(replay);
            }
        }
        Err(err)
    }

    /// Earlier transfer committed by this sender under the same key, if any
    async fn find_replay(
        &self,
        request: &ValidatedTransfer,
    ) -> Result<Option<TransferResult>, TransferError> {
        let Some(key) = &request.idempotency_key else {
            return Ok(None);
        };

        let existing = self
            .storage
            .find_by_idempotency_key(&request.sender_id, key.as_str())
            .await
            .map_err(|e| TransferError::aborted(format!("Idempotency lookup failed: {}", e)))?;

        match existing {
            None => Ok(None),
            Some(record) if record.request_hash.as_deref() == Some(request.request_hash.as_str()) => {
                tracing::info!(
                    transfer_id = %record.id,
                    idempotency_key = %key,
                    "Replaying committed transfer"
                );
                Ok(Some(TransferResult::from_record(&record, true)))
            }
            Some(_) => Err(TransferError::IdempotencyConflict(key.to_string())),
        }
    }

    /// Display names captured into the record. Resolver failure is non-fatal.
    async fn snapshot_names(&self, request: &ValidatedTransfer) -> (String, String) {
        let participants = [request.sender_id.clone(), request.receiver_id.clone()];
        match self.resolver.resolve_many(&participants).await {
            Ok(mut names) => (
                names.remove(&request.sender_id).unwrap_or_default(),
                names.remove(&request.receiver_id).unwrap_or_default(),
            ),
            Err(e) => {
                tracing::warn!(
                    transfer_id = %request.transfer_id,
                    error = %e,
                    "Name resolution failed, storing empty snapshots"
                );
                (String::new(), String::new())
            }
        }
    }

    // =========================================================================
    // Reserving
    // =========================================================================

    async fn reserve(&self, request: &ValidatedTransfer) -> Result<(), TransferError> {
        let available = match self.storage.get_balance(&request.sender_id).await {
            Ok(balance) => balance,
            Err(StoreError::AccountNotFound(_)) => {
                return Err(TransferError::invalid("Unknown sender"));
            }
            Err(e) => return Err(TransferError::aborted(e.to_string())),
        };

        if !available.is_sufficient_for(&request.amount) {
            return Err(TransferError::InsufficientFunds {
                required: request.amount.units(),
                available: available.units(),
            });
        }

        match self.storage.get_balance(&request.receiver_id).await {
            Ok(_) => Ok(()),
            Err(StoreError::AccountNotFound(_)) => {
                Err(TransferError::UnknownRecipient(request.receiver_id.clone()))
            }
            Err(e) => Err(TransferError::aborted(e.to_string())),
        }
    }

    // =========================================================================
    // Committing
    // =========================================================================

    async fn commit(
        &self,
        request: &ValidatedTransfer,
        sender_name: &str,
        receiver_name: &str,
    ) -> StoreResult<TransferRecord> {
        let mut scope = self.storage.begin().await?;

        let staged = stage(
            scope.as_mut(),
            request.to_new_transfer(sender_name, receiver_name),
        )
        .await;

        match staged {
            Ok(record) => {
                scope.commit().await?;
                Ok(record)
            }
            Err(e) => {
                if let Err(rollback_err) = scope.rollback().await {
                    tracing::warn!(
                        transfer_id = %request.transfer_id,
                        error = %rollback_err,
                        "Rollback failed; scope discarded on drop"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Debit, credit and append inside `scope`. Adjustments run in ascending
/// `UserId` order so that opposing transfers lock rows in the same order.
async fn stage(scope: &mut dyn AtomicScope, transfer: NewTransfer) -> StoreResult<TransferRecord> {
    let units = transfer.amount.units();
    let mut adjustments = [
        (transfer.sender_id.clone(), -units),
        (transfer.receiver_id.clone(), units),
    ];
    adjustments.sort_by(|a, b| a.0.cmp(&b.0));

    for (user_id, delta) in &adjustments {
        scope.atomic_adjust(user_id, *delta).await?;
    }

    scope.append(transfer).await
}

fn map_commit_error(request: &ValidatedTransfer, err: StoreError) -> TransferError {
    match err {
        StoreError::InsufficientFunds {
            user_id, available, ..
        } if user_id == request.sender_id => TransferError::InsufficientFunds {
            required: request.amount.units(),
            available,
        },
        StoreError::AccountNotFound(user_id) if user_id == request.receiver_id => {
            TransferError::UnknownRecipient(user_id)
        }
        StoreError::AccountNotFound(_) => TransferError::invalid("Unknown sender"),
        StoreError::BalanceOverflow(user_id) => TransferError::invalid(format!(
            "Balance of {} would exceed the maximum",
            user_id
        )),
        StoreError::Conflict(reason) => {
            TransferError::aborted(format!("Concurrent update on a shared account: {}", reason))
        }
        other => TransferError::aborted(other.to_string()),
    }
}
