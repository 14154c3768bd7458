//! In-memory storage backend
//!
//! Balances carry a version that is bumped on every committed change.
//! A scope records the version of each account the first time it touches
//! it and stages its deltas locally; commit re-checks every recorded version
//! under the lock and either applies everything or nothing. Unrelated
//! transfers never wait on each other beyond the short commit critical
//! section.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{AmountError, Balance, NewTransfer, TransferRecord, UserId};

use super::{AccountStore, AtomicScope, LedgerStore, Storage, StoreError, StoreResult};

#[derive(Debug, Clone, Copy)]
struct AccountRow {
    balance: Balance,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<UserId, AccountRow>,
    /// Commit order
    transfers: Vec<TransferRecord>,
    idempotency: HashMap<(UserId, String), usize>,
}

/// One-shot failure to inject into the next scope that reaches the
/// matching step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `append` fails with a storage error
    FailAppend,
    /// `commit` fails with a storage error
    FailCommit,
    /// `commit` reports a concurrency conflict
    ConflictOnCommit,
    /// `commit` sleeps before applying
    DelayCommit(Duration),
}

/// In-memory Account Store + Ledger Store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<VecDeque<Fault>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault; faults fire in the order they were injected.
    pub fn inject_fault(&self, fault: Fault) {
        lock(&self.faults).push_back(fault);
    }

    /// Sum of all balances
    pub fn total_balance(&self) -> i64 {
        lock(&self.state)
            .accounts
            .values()
            .map(|row| row.balance.units())
            .sum()
    }

    /// Number of committed transfer records
    pub fn transfer_count(&self) -> usize {
        lock(&self.state).transfers.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_fault(faults: &Mutex<VecDeque<Fault>>, wanted: impl Fn(&Fault) -> bool) -> Option<Fault> {
    let mut queue = lock(faults);
    if queue.front().map(&wanted).unwrap_or(false) {
        queue.pop_front()
    } else {
        None
    }
}

fn adjust_error(user_id: &UserId, available: Balance, delta: i64, err: AmountError) -> StoreError {
    match err {
        AmountError::NegativeBalance(_) => StoreError::InsufficientFunds {
            user_id: user_id.clone(),
            available: available.units(),
            delta,
        },
        _ => StoreError::BalanceOverflow(user_id.clone()),
    }
}

#[async_trait]
impl AccountStore for InMemoryStorage {
    async fn get_balance(&self, user_id: &UserId) -> StoreResult<Balance> {
        lock(&self.state)
            .accounts
            .get(user_id)
            .map(|row| row.balance)
            .ok_or_else(|| StoreError::AccountNotFound(user_id.clone()))
    }

    async fn open_account(&self, user_id: &UserId, initial: Balance) -> StoreResult<()> {
        let mut state = lock(&self.state);
        if state.accounts.contains_key(user_id) {
            return Err(StoreError::AccountExists(user_id.clone()));
        }
        state.accounts.insert(
            user_id.clone(),
            AccountRow {
                balance: initial,
                version: 0,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStorage {
    async fn query_by_participant(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StoreResult<Vec<TransferRecord>> {
        let state = lock(&self.state);
        let mut hits: Vec<TransferRecord> = state
            .transfers
            .iter()
            .rev()
            .filter(|t| t.involves(user_id))
            .cloned()
            .collect();
        // Stable sort: equal timestamps keep newest-commit-first
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_transfer(&self, id: Uuid) -> StoreResult<Option<TransferRecord>> {
        Ok(lock(&self.state)
            .transfers
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        sender_id: &UserId,
        key: &str,
    ) -> StoreResult<Option<TransferRecord>> {
        let state = lock(&self.state);
        Ok(state
            .idempotency
            .get(&(sender_id.clone(), key.to_string()))
            .and_then(|idx| state.transfers.get(*idx))
            .cloned())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> StoreResult<Box<dyn AtomicScope>> {
        Ok(Box::new(MemoryScope {
            state: Arc::clone(&self.state),
            faults: Arc::clone(&self.faults),
            observed: HashMap::new(),
            deltas: Vec::new(),
            appended: Vec::new(),
        }))
    }
}

struct MemoryScope {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<VecDeque<Fault>>>,
    /// Account version seen on first touch
    observed: HashMap<UserId, u64>,
    deltas: Vec<(UserId, i64)>,
    appended: Vec<TransferRecord>,
}

impl MemoryScope {
    fn staged_delta(&self, user_id: &UserId) -> i64 {
        self.deltas
            .iter()
            .filter(|(id, _)| id == user_id)
            .map(|(_, delta)| *delta)
            .sum()
    }

    fn stage_adjust(&mut self, user_id: &UserId, delta: i64) -> StoreResult<Balance> {
        let row = {
            let state = lock(&self.state);
            *state
                .accounts
                .get(user_id)
                .ok_or_else(|| StoreError::AccountNotFound(user_id.clone()))?
        };

        let seen = *self.observed.entry(user_id.clone()).or_insert(row.version);
        if seen != row.version {
            return Err(StoreError::Conflict(format!(
                "account {} changed during scope (version {} -> {})",
                user_id, seen, row.version
            )));
        }

        let current = row
            .balance
            .adjust(self.staged_delta(user_id))
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
        let next = current
            .adjust(delta)
            .map_err(|e| adjust_error(user_id, current, delta, e))?;

        self.deltas.push((user_id.clone(), delta));
        Ok(next)
    }

    fn stage_append(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord> {
        {
            let state = lock(&self.state);
            for participant in [&transfer.sender_id, &transfer.receiver_id] {
                if !state.accounts.contains_key(participant) {
                    return Err(StoreError::AccountNotFound(participant.clone()));
                }
            }
            if let Some(key) = &transfer.idempotency_key {
                if state
                    .idempotency
                    .contains_key(&(transfer.sender_id.clone(), key.clone()))
                {
                    return Err(StoreError::DuplicateIdempotencyKey(key.clone()));
                }
            }
        }

        let record = transfer.into_record(Utc::now());
        self.appended.push(record.clone());
        Ok(record)
    }

    fn apply(self) -> StoreResult<()> {
        let mut state = lock(&self.state);

        for (user_id, seen) in &self.observed {
            let row = state
                .accounts
                .get(user_id)
                .ok_or_else(|| StoreError::AccountNotFound(user_id.clone()))?;
            if row.version != *seen {
                return Err(StoreError::Conflict(format!(
                    "account {} changed before commit (version {} -> {})",
                    user_id, seen, row.version
                )));
            }
        }

        for record in &self.appended {
            if let Some(key) = &record.idempotency_key {
                if state
                    .idempotency
                    .contains_key(&(record.sender_id.clone(), key.clone()))
                {
                    return Err(StoreError::DuplicateIdempotencyKey(key.clone()));
                }
            }
        }

        let mut next: HashMap<UserId, Balance> = HashMap::new();
        for (user_id, delta) in &self.deltas {
            let base = match next.get(user_id) {
                Some(balance) => *balance,
                None => state
                    .accounts
                    .get(user_id)
                    .map(|row| row.balance)
                    .ok_or_else(|| StoreError::AccountNotFound(user_id.clone()))?,
            };
            let updated = base
                .adjust(*delta)
                .map_err(|e| adjust_error(user_id, base, *delta, e))?;
            next.insert(user_id.clone(), updated);
        }

        // All checks passed; nothing below can fail
        for (user_id, balance) in next {
            if let Some(row) = state.accounts.get_mut(&user_id) {
                row.balance = balance;
                row.version += 1;
            }
        }
        for record in self.appended {
            let idx = state.transfers.len();
            if let Some(key) = &record.idempotency_key {
                state
                    .idempotency
                    .insert((record.sender_id.clone(), key.clone()), idx);
            }
            state.transfers.push(record);
        }

        Ok(())
    }
}

#[async_trait]
impl AtomicScope for MemoryScope {
    async fn atomic_adjust(&mut self, user_id: &UserId, delta: i64) -> StoreResult<Balance> {
        self.stage_adjust(user_id, delta)
    }

    async fn append(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord> {
        if take_fault(&self.faults, |f| *f == Fault::FailAppend).is_some() {
            return Err(StoreError::Injected("append"));
        }
        self.stage_append(transfer)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let fault = take_fault(&self.faults, |f| {
            matches!(
                f,
                Fault::FailCommit | Fault::ConflictOnCommit | Fault::DelayCommit(_)
            )
        });
        match fault {
            Some(Fault::FailCommit) => return Err(StoreError::Injected("commit")),
            Some(Fault::ConflictOnCommit) => {
                return Err(StoreError::Conflict("injected commit conflict".to_string()))
            }
            Some(Fault::DelayCommit(delay)) => tokio::time::sleep(delay).await,
            _ => {}
        }
        (*self).apply()
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
