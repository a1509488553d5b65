//! Transaction - a scoped unit of work bound to one connection.
//!
//! A transaction is Open until commit or rollback moves it to a terminal
//! state; terminal transactions reject further work instead of crashing.
//! Connections hand out at most one open transaction at a time.

use crate::connection::run_exec;
use crate::error::{Error, Result};
use crate::runtime::runtime;
use libsql::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Locking behavior requested at transaction start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Take locks lazily, on first use (engine default)
    #[default]
    Deferred,
    /// Take the write lock immediately
    Write,
    /// Read-only snapshot
    Read,
}

impl Behavior {
    /// Parse a boundary behavior string. Absent or unrecognized values
    /// fall back to the deferred default.
    pub fn parse(behavior: Option<&str>) -> Self {
        match behavior {
            Some("WRITE") => Behavior::Write,
            Some("READ") => Behavior::Read,
            _ => Behavior::Deferred,
        }
    }
}

impl From<Behavior> for libsql::TransactionBehavior {
    fn from(behavior: Behavior) -> Self {
        match behavior {
            Behavior::Deferred => libsql::TransactionBehavior::Deferred,
            Behavior::Write => libsql::TransactionBehavior::Immediate,
            Behavior::Read => libsql::TransactionBehavior::ReadOnly,
        }
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxStatus {
    Open,
    Committed,
    RolledBack,
}

enum TrxSlot {
    Open(libsql::Transaction),
    Committed,
    RolledBack,
}

/// A transaction bound to one connection.
///
/// Holds the connection's transaction latch for as long as it is open;
/// commit, rollback and drop all release it exactly once.
pub struct Transaction {
    slot: Mutex<TrxSlot>,
    latch: Arc<AtomicBool>,
}

impl Transaction {
    pub(crate) fn new(tx: libsql::Transaction, latch: Arc<AtomicBool>) -> Self {
        Self {
            slot: Mutex::new(TrxSlot::Open(tx)),
            latch,
        }
    }

    fn slot(&self) -> MutexGuard<'_, TrxSlot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TrxStatus {
        match &*self.slot() {
            TrxSlot::Open(_) => TrxStatus::Open,
            TrxSlot::Committed => TrxStatus::Committed,
            TrxSlot::RolledBack => TrxStatus::RolledBack,
        }
    }

    /// Execute a mutating statement inside the transaction scope.
    ///
    /// A statement error leaves the transaction Open; the caller decides
    /// whether to roll back.
    pub fn exec(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        match &*self.slot() {
            TrxSlot::Open(tx) => run_exec(tx, sql, params),
            TrxSlot::Committed => Err(Error::TransactionState("already committed")),
            TrxSlot::RolledBack => Err(Error::TransactionState("already rolled back")),
        }
    }

    /// Commit the transaction.
    ///
    /// On success the state becomes Committed. A commit failure leaves
    /// the transaction RolledBack: the kernel rolls back the work, and
    /// either way the state is terminal.
    pub fn commit(&self) -> Result<()> {
        let mut slot = self.slot();
        let tx = match std::mem::replace(&mut *slot, TrxSlot::Committed) {
            TrxSlot::Open(tx) => tx,
            TrxSlot::Committed => {
                *slot = TrxSlot::Committed;
                return Err(Error::TransactionState("already committed"));
            }
            TrxSlot::RolledBack => {
                *slot = TrxSlot::RolledBack;
                return Err(Error::TransactionState("already rolled back"));
            }
        };

        let result = runtime().block_on(tx.commit());
        self.latch.store(false, Ordering::Release);
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                *slot = TrxSlot::RolledBack;
                Err(Error::Query(e.to_string()))
            }
        }
    }

    /// Roll the transaction back.
    pub fn rollback(&self) -> Result<()> {
        let mut slot = self.slot();
        let tx = match std::mem::replace(&mut *slot, TrxSlot::RolledBack) {
            TrxSlot::Open(tx) => tx,
            TrxSlot::Committed => {
                *slot = TrxSlot::Committed;
                return Err(Error::TransactionState("already committed"));
            }
            TrxSlot::RolledBack => {
                *slot = TrxSlot::RolledBack;
                return Err(Error::TransactionState("already rolled back"));
            }
        };

        let result = runtime().block_on(tx.rollback());
        self.latch.store(false, Ordering::Release);
        result.map_err(|e| Error::Query(e.to_string()))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let slot = match self.slot.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        // an abandoned open transaction rolls back and frees the latch
        if let TrxSlot::Open(tx) = std::mem::replace(slot, TrxSlot::RolledBack) {
            let _ = runtime().block_on(tx.rollback());
            self.latch.store(false, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("status", &self.status())
            .finish()
    }
}
