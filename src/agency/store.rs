use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::agency::snapshot::Snapshot;
use crate::agency::transaction::{Operation, Transaction, WriteResult};
use crate::error::{Result, SupervisionError};

/// Client contract of the replicated configuration store.
///
/// Implementations must be linearizable: every transaction of a batch is
/// checked against the state left by the previous one, and a transaction
/// whose preconditions fail applies nothing.
pub trait Agency: Send + Sync {
    /// Applies a batch of transactions in order.
    fn transact(&self, batch: &[Transaction]) -> Result<WriteResult>;

    /// Consistent point-in-time read of the subtree at `path`.
    fn read(&self, path: &str) -> Result<Snapshot>;

    /// Convenience for a batch of one.
    fn write(&self, trx: &Transaction) -> Result<WriteResult> {
        self.transact(std::slice::from_ref(trx))
    }
}

/// A single applied transaction.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub index: u64,
    pub transaction: Transaction,
    pub applied_at: DateTime<Utc>,
}

/// Tree plus the append-only log of everything applied to it.
///
/// Log indices start at 1 and grow by one per applied transaction; a
/// rejected transaction never reaches the log, so `0` is free to mean
/// "rejected" in a [`WriteResult`].
#[derive(Debug, Default)]
pub struct AgencyState {
    pub tree: Snapshot,
    pub log: Vec<LogEntry>,
}

impl AgencyState {
    pub fn new(tree: Value) -> Self {
        Self {
            tree: Snapshot::new(tree),
            log: Vec::new(),
        }
    }

    /// Index of the last applied transaction (0 when nothing was applied)
    pub fn last_index(&self) -> u64 {
        self.log.last().map(|e| e.index).unwrap_or(0)
    }

    /// Check preconditions and apply. Returns the log index, or 0 if rejected.
    pub fn apply(&mut self, trx: &Transaction) -> u64 {
        let satisfied = trx
            .preconditions()
            .iter()
            .all(|(path, precondition)| precondition.holds(self.tree.lookup(path)));
        if !satisfied {
            return 0;
        }

        for (path, operation) in trx.operations() {
            match operation {
                Operation::Set(value) => self.tree.set(path, value.clone()),
                Operation::Delete => {
                    self.tree.delete(path);
                }
            }
        }

        let index = self.last_index() + 1;
        self.log.push(LogEntry {
            index,
            transaction: trx.clone(),
            applied_at: Utc::now(),
        });
        index
    }
}

/// Single-process agency. Linearizable through one mutex around the state.
#[derive(Debug, Default)]
pub struct InMemoryAgency {
    state: Mutex<AgencyState>,
}

impl InMemoryAgency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agency seeded with an initial tree.
    pub fn with_tree(tree: Value) -> Self {
        Self {
            state: Mutex::new(AgencyState::new(tree)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AgencyState>> {
        self.state
            .lock()
            .map_err(|_| SupervisionError::StoreUnavailable("agency state lock poisoned".into()))
    }

    pub fn last_index(&self) -> Result<u64> {
        Ok(self.lock()?.last_index())
    }

    pub fn log_len(&self) -> Result<usize> {
        Ok(self.lock()?.log.len())
    }

    /// Entries starting at `index` (inclusive)
    pub fn entries_from(&self, index: u64) -> Result<Vec<LogEntry>> {
        let state = self.lock()?;
        Ok(state
            .log
            .iter()
            .filter(|e| e.index >= index)
            .cloned()
            .collect())
    }

    /// Copy of the whole tree.
    pub fn dump(&self) -> Result<Value> {
        Ok(self.lock()?.tree.root().clone())
    }
}

impl Agency for InMemoryAgency {
    fn transact(&self, batch: &[Transaction]) -> Result<WriteResult> {
        let mut state = self.lock()?;
        let indices: Vec<u64> = batch.iter().map(|trx| state.apply(trx)).collect();
        let accepted = !indices.is_empty() && indices.iter().all(|&i| i != 0);
        tracing::trace!(
            transactions = batch.len(),
            accepted,
            last_index = state.last_index(),
            "Agency transaction batch"
        );
        Ok(WriteResult { accepted, indices })
    }

    fn read(&self, path: &str) -> Result<Snapshot> {
        Ok(self.lock()?.tree.subtree(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_new_agency_is_empty() {
        let agency = InMemoryAgency::new();
        assert_eq!(agency.last_index().unwrap(), 0);
        assert_eq!(agency.dump().unwrap(), json!({}));
    }

    #[test]
    fn test_write_applies_and_logs() {
        let agency = InMemoryAgency::new();
        let mut trx = Transaction::new();
        trx.set("/arango/Target/FailedServers/A", json!([]));

        let res = agency.write(&trx).unwrap();
        assert!(res.successful());
        assert_eq!(res.indices, vec![1]);
        assert_eq!(agency.log_len().unwrap(), 1);

        let snap = agency.read("/arango").unwrap();
        assert_eq!(snap.get("/Target/FailedServers/A").unwrap(), &json!([]));
    }

    #[test]
    fn test_failed_precondition_applies_nothing() {
        let agency = InMemoryAgency::with_tree(json!({"a": 1}));
        let mut trx = Transaction::new();
        trx.set("/b", json!(2))
            .delete("/a")
            .expect_old("/a", json!(2));

        let res = agency.write(&trx).unwrap();
        assert!(!res.accepted);
        assert_eq!(res.indices, vec![0]);
        assert_eq!(agency.dump().unwrap(), json!({"a": 1}));
        assert_eq!(agency.last_index().unwrap(), 0);
    }

    #[test]
    fn test_batch_reports_per_transaction_indices() {
        let agency = InMemoryAgency::new();
        let mut first = Transaction::new();
        first.set("/x", json!(1)).expect_empty("/x");
        // Same precondition: must lose against the first
        let second = first.clone();
        let mut third = Transaction::new();
        third.set("/y", json!(2)).expect_old("/x", json!(1));

        let res = agency.transact(&[first, second, third]).unwrap();
        assert_eq!(res.indices, vec![1, 0, 2]);
        assert!(!res.accepted);
        assert!(res.applied(0));
        assert!(!res.applied(1));
        assert!(res.applied(2));

        let entries = agency.entries_from(2).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 2);
    }

    #[test]
    fn test_read_missing_subtree_is_empty() {
        let agency = InMemoryAgency::with_tree(json!({"a": {"b": 1}}));
        assert_eq!(agency.read("/nope").unwrap(), Snapshot::empty());
        assert_eq!(agency.read("/").unwrap().root(), &json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_concurrent_cas_has_one_winner() {
        let agency = Arc::new(InMemoryAgency::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let agency = agency.clone();
                std::thread::spawn(move || {
                    let mut trx = Transaction::new();
                    trx.set("/Target/BlockedServers/A", json!({"jobId": i.to_string()}))
                        .expect_empty("/Target/BlockedServers/A");
                    agency.write(&trx).unwrap().successful()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
