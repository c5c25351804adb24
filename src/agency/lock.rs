use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::agency::snapshot::join;
use crate::agency::store::Agency;
use crate::agency::transaction::Transaction;
use crate::error::Result;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);
const READ: &str = "READ";
const WRITE: &str = "WRITE";

/// Read/write locks stored at `<key>/Lock`, built from compare-and-swap
/// transactions on the same store.
///
/// Meant for callers outside the job protocol; supervision jobs never take
/// locks. Locks carry no TTL, so a holder that dies keeps its lock until an
/// operator removes `<key>/Lock`.
pub trait AgencyLocks: Agency {
    /// Shared lock. Waits up to `timeout` while a writer holds the key.
    fn lock_read(&self, key: &str, timeout: Duration) -> Result<bool> {
        acquire(timeout, || try_lock_read(self, key))
    }

    /// Exclusive lock. Waits up to `timeout` while anyone holds the key.
    fn lock_write(&self, key: &str, timeout: Duration) -> Result<bool> {
        acquire(timeout, || try_lock_write(self, key))
    }

    /// Drops one reader. Returns false if no read lock was held.
    fn unlock_read(&self, key: &str) -> Result<bool> {
        let path = lock_path(key);
        loop {
            let Some(current) = current_lock(self, key)? else {
                return Ok(false);
            };
            if mode(&current) != Some(READ) {
                return Ok(false);
            }
            let readers = current.get("readers").and_then(Value::as_u64).unwrap_or(1);

            let mut trx = Transaction::new();
            if readers > 1 {
                trx.set(&path, json!({"mode": READ, "readers": readers - 1}));
            } else {
                trx.delete(&path);
            }
            trx.expect_old(&path, current);
            if self.write(&trx)?.successful() {
                return Ok(true);
            }
        }
    }

    /// Releases the write lock. Returns false if none was held.
    fn unlock_write(&self, key: &str) -> Result<bool> {
        let path = lock_path(key);
        let mut trx = Transaction::new();
        trx.delete(&path).expect_old(&path, json!({"mode": WRITE}));
        Ok(self.write(&trx)?.successful())
    }
}

impl<A: Agency + ?Sized> AgencyLocks for A {}

fn lock_path(key: &str) -> String {
    join(key, "Lock")
}

fn mode(lock: &Value) -> Option<&str> {
    lock.get("mode").and_then(Value::as_str)
}

fn current_lock<A: Agency + ?Sized>(agency: &A, key: &str) -> Result<Option<Value>> {
    Ok(agency.read(key)?.lookup("Lock").cloned())
}

fn try_lock_read<A: Agency + ?Sized>(agency: &A, key: &str) -> Result<bool> {
    let path = lock_path(key);
    let mut trx = Transaction::new();
    match current_lock(agency, key)? {
        None => {
            trx.set(&path, json!({"mode": READ, "readers": 1}))
                .expect_empty(&path);
        }
        Some(current) if mode(&current) == Some(READ) => {
            let readers = current.get("readers").and_then(Value::as_u64).unwrap_or(0);
            trx.set(&path, json!({"mode": READ, "readers": readers + 1}))
                .expect_old(&path, current);
        }
        Some(_) => return Ok(false),
    }
    Ok(agency.write(&trx)?.successful())
}

fn try_lock_write<A: Agency + ?Sized>(agency: &A, key: &str) -> Result<bool> {
    let path = lock_path(key);
    let mut trx = Transaction::new();
    trx.set(&path, json!({"mode": WRITE})).expect_empty(&path);
    Ok(agency.write(&trx)?.successful())
}

fn acquire(timeout: Duration, mut attempt: impl FnMut() -> Result<bool>) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if attempt()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        std::thread::sleep(LOCK_RETRY_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::store::InMemoryAgency;

    const KEY: &str = "/arango/Plan";
    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_readers_share() {
        let agency = InMemoryAgency::new();
        assert!(agency.lock_read(KEY, SHORT).unwrap());
        assert!(agency.lock_read(KEY, SHORT).unwrap());

        let lock = agency.read(KEY).unwrap();
        assert_eq!(lock.get_u64("/Lock/readers").unwrap(), 2);

        assert!(agency.unlock_read(KEY).unwrap());
        assert!(agency.unlock_read(KEY).unwrap());
        assert!(!agency.read(KEY).unwrap().exists("/Lock"));
        assert!(!agency.unlock_read(KEY).unwrap());
    }

    #[test]
    fn test_writer_excludes_everyone() {
        let agency = InMemoryAgency::new();
        assert!(agency.lock_write(KEY, SHORT).unwrap());
        assert!(!agency.lock_write(KEY, SHORT).unwrap());
        assert!(!agency.lock_read(KEY, SHORT).unwrap());
        assert!(!agency.unlock_read(KEY).unwrap());

        assert!(agency.unlock_write(KEY).unwrap());
        assert!(agency.lock_read(KEY, SHORT).unwrap());
    }

    #[test]
    fn test_writer_waits_for_readers() {
        let agency = InMemoryAgency::new();
        assert!(agency.lock_read(KEY, SHORT).unwrap());
        assert!(!agency.lock_write(KEY, SHORT).unwrap());
        assert!(!agency.unlock_write(KEY).unwrap());
    }
}
