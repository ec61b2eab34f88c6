//! In-memory ledger.
//!
//! Holds orders, accounts, outbox and inbox behind one mutex. Each operation
//! runs under a single lock acquisition, which makes it atomic. Outbox claims
//! emulate `SKIP LOCKED` with a set of claimed sequence numbers that is
//! released on commit or drop.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    helpers, AccountLedger, InboxOutcome, InboxStore, OrderLedger, OutboxClaim, OutboxStore,
    Result, StatusChange, StorageError,
};
use crate::bus::outbox::{NewOutboxEntry, OutboxEntry};
use crate::domain::{
    Account, NewOrder, Order, OrderCreated, OrderStatus, PaymentOutcome, PaymentStatus,
    ValidationError,
};

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    accounts: HashMap<Uuid, i64>,
    outbox: Vec<OutboxEntry>,
    next_seq: i64,
    inbox: HashMap<String, DateTime<Utc>>,
    claimed: HashSet<i64>,
}

impl State {
    fn append_outbox(&mut self, entry: NewOutboxEntry) {
        self.next_seq += 1;
        self.outbox.push(entry.into_entry(self.next_seq));
    }

    /// Conditional insert. `false` means the message was already recorded.
    fn record_inbox(&mut self, message_id: &str) -> bool {
        if self.inbox.contains_key(message_id) {
            return false;
        }
        self.inbox.insert(message_id.to_string(), helpers::now());
        true
    }

    fn release(&mut self, seqs: &[i64]) {
        for seq in seqs {
            self.claimed.remove(seq);
        }
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory implementation of every ledger trait.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StorageError::Unavailable` until
    /// cleared. Simulates a database outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Append an outbox entry outside of any business mutation.
    pub fn enqueue(&self, entry: NewOutboxEntry) -> Result<()> {
        self.state()?.append_outbox(entry);
        Ok(())
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("in-memory ledger offline".into()));
        }
        Ok(lock_state(&self.state))
    }
}

// ============================================================================
// Outbox
// ============================================================================

struct MemoryOutboxClaim {
    ledger: InMemoryLedger,
    entries: Vec<OutboxEntry>,
    marked: Vec<Uuid>,
    released: bool,
}

impl MemoryOutboxClaim {
    fn seqs(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.seq).collect()
    }
}

#[async_trait]
impl OutboxClaim for MemoryOutboxClaim {
    fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    async fn mark_published(&mut self, id: Uuid) -> Result<()> {
        if self.released {
            return Err(StorageError::Corrupt("claim already committed".into()));
        }
        if !self.entries.iter().any(|e| e.id == id) {
            return Err(StorageError::Corrupt(format!("entry {id} is not part of this claim")));
        }
        self.marked.push(id);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        let seqs = self.seqs();
        let mut state = self.ledger.state()?;
        for entry in state.outbox.iter_mut() {
            if self.marked.contains(&entry.id) {
                entry.published = true;
            }
        }
        state.release(&seqs);
        self.released = true;
        Ok(())
    }
}

impl Drop for MemoryOutboxClaim {
    fn drop(&mut self) {
        if !self.released {
            let seqs = self.seqs();
            lock_state(&self.ledger.state).release(&seqs);
        }
    }
}

#[async_trait]
impl OutboxStore for InMemoryLedger {
    async fn claim_pending(&self, limit: usize) -> Result<Box<dyn OutboxClaim>> {
        let entries = {
            let mut state = self.state()?;
            let mut pending: Vec<OutboxEntry> = state
                .outbox
                .iter()
                .filter(|e| !e.published && !state.claimed.contains(&e.seq))
                .cloned()
                .collect();
            pending.sort_by(|a, b| (a.created_at, a.seq).cmp(&(b.created_at, b.seq)));
            pending.truncate(limit);
            for entry in &pending {
                state.claimed.insert(entry.seq);
            }
            pending
        };

        Ok(Box::new(MemoryOutboxClaim {
            ledger: self.clone(),
            entries,
            marked: Vec::new(),
            released: false,
        }))
    }

    async fn list_outbox(&self) -> Result<Vec<OutboxEntry>> {
        let mut entries = self.state()?.outbox.clone();
        entries.sort_by(|a, b| (a.created_at, a.seq).cmp(&(b.created_at, b.seq)));
        Ok(entries)
    }
}

#[async_trait]
impl InboxStore for InMemoryLedger {
    async fn is_processed(&self, message_id: &str) -> Result<bool> {
        Ok(self.state()?.inbox.contains_key(message_id))
    }

    async fn inbox_len(&self) -> Result<usize> {
        Ok(self.state()?.inbox.len())
    }
}

// ============================================================================
// Orders
// ============================================================================

#[async_trait]
impl OrderLedger for InMemoryLedger {
    async fn create_order(&self, order: NewOrder, topic: &str) -> Result<Order> {
        let order = order.into_order();
        let entry = NewOutboxEntry::for_event(
            topic,
            order.id,
            &OrderCreated {
                order_id: order.id,
                user_id: order.user_id,
                amount: order.amount,
            },
        )?;

        let mut state = self.state()?;
        state.orders.insert(order.id, order.clone());
        state.append_outbox(entry);
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state()?.orders.get(&id).cloned())
    }

    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state()?
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn apply_payment_outcome(
        &self,
        message_id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<InboxOutcome<StatusChange>> {
        let mut state = self.state()?;
        if !state.record_inbox(message_id) {
            return Ok(InboxOutcome::Duplicate);
        }

        let status = OrderStatus::from(outcome.status);
        let change = match state.orders.get_mut(&outcome.order_id) {
            Some(order) => {
                order.status = status;
                StatusChange::Updated {
                    user_id: order.user_id,
                    status,
                }
            }
            None => StatusChange::OrderNotFound,
        };
        Ok(InboxOutcome::Applied(change))
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[async_trait]
impl AccountLedger for InMemoryLedger {
    async fn create_account(&self, user_id: Uuid) -> Result<Account> {
        let mut state = self.state()?;
        if state.accounts.contains_key(&user_id) {
            return Err(StorageError::DuplicateAccount(user_id));
        }
        state.accounts.insert(user_id, 0);
        Ok(Account::empty(user_id))
    }

    async fn deposit(&self, user_id: Uuid, amount: i64) -> Result<Account> {
        let amount = crate::domain::positive_amount(amount)?;
        let mut state = self.state()?;
        let balance = state
            .accounts
            .get_mut(&user_id)
            .ok_or(StorageError::AccountNotFound(user_id))?;
        *balance = balance
            .checked_add(amount)
            .ok_or(ValidationError::BalanceOverflow { user_id, amount })?;
        Ok(Account {
            user_id,
            balance: *balance,
        })
    }

    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>> {
        Ok(self
            .state()?
            .accounts
            .get(&user_id)
            .map(|balance| Account {
                user_id,
                balance: *balance,
            }))
    }

    async fn apply_order_created(
        &self,
        message_id: &str,
        event: &OrderCreated,
        reply_topic: &str,
    ) -> Result<InboxOutcome<PaymentStatus>> {
        let finished = NewOutboxEntry::for_event(
            reply_topic,
            event.order_id,
            &PaymentOutcome {
                order_id: event.order_id,
                status: PaymentStatus::Finished,
            },
        )?;
        let cancelled = NewOutboxEntry::for_event(
            reply_topic,
            event.order_id,
            &PaymentOutcome {
                order_id: event.order_id,
                status: PaymentStatus::Cancelled,
            },
        )?;

        let mut state = self.state()?;
        if !state.record_inbox(message_id) {
            return Ok(InboxOutcome::Duplicate);
        }

        let debited = match state.accounts.get_mut(&event.user_id) {
            Some(balance) if event.amount > 0 && *balance >= event.amount => {
                *balance -= event.amount;
                true
            }
            _ => false,
        };

        let (status, reply) = if debited {
            (PaymentStatus::Finished, finished)
        } else {
            (PaymentStatus::Cancelled, cancelled)
        };
        state.append_outbox(reply);
        Ok(InboxOutcome::Applied(status))
    }
}
