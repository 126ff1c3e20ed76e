use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use sea_orm::{DatabaseConnection, DbErr, RuntimeErr};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{EngineError, RemainderPolicy, ResultEngine};

mod allocate;
mod invoices;
mod items;
mod reconcile;

pub use reconcile::{Drift, InvoiceDetail};

/// Installment cap used when the builder is not told otherwise.
pub const DEFAULT_MAX_INSTALLMENTS: u32 = 48;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Attempts made by [`retry_busy`] before giving up.
const BUSY_ATTEMPTS: u32 = 5;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// `true` when SQLite refused the statement because another connection
/// holds a conflicting lock.
fn is_busy(err: &EngineError) -> bool {
    let db_err = match err {
        EngineError::Allocation { source, .. } => return is_busy(source),
        EngineError::Database(db_err) => db_err,
        _ => return false,
    };
    let (DbErr::Conn(RuntimeErr::SqlxError(sqlx_err))
    | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err))
    | DbErr::Query(RuntimeErr::SqlxError(sqlx_err))) = db_err
    else {
        return false;
    };
    sqlx_err
        .as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Run a whole transaction again while the database reports it busy.
///
/// `op` must open and commit its own transaction, so every attempt starts
/// from a clean state.
async fn retry_busy<T, F, Fut>(what: &str, mut op: F) -> ResultEngine<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResultEngine<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if attempt < BUSY_ATTEMPTS && is_busy(&err) => {
                tracing::debug!("{what}: database busy on attempt {attempt}, retrying");
                tokio::time::sleep(Duration::from_millis(20 << attempt)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Serializes writes per owner inside one process.
///
/// The unique index on `(owner, account, month)` keeps concurrent writers
/// from different processes from duplicating invoices; this lock additionally
/// keeps two allocations of the same owner from interleaving their
/// find-or-create steps. An owner's entry is dropped once nobody holds or
/// waits for it.
#[derive(Debug, Default)]
struct OwnerLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    async fn acquire(&self, owner_id: &str) -> OwnerGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(owner_id.to_string()).or_default())
        };
        OwnerGuard {
            locks: self,
            owner_id: owner_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of an owner's write.
struct OwnerGuard<'a> {
    locks: &'a OwnerLocks,
    owner_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map still points at the mutex: no holder, no waiter.
        if locks
            .get(&self.owner_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.owner_id);
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    max_installments: u32,
    remainder_policy: RemainderPolicy,
    owner_locks: OwnerLocks,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn max_installments(&self) -> u32 {
        self.max_installments
    }

    pub fn remainder_policy(&self) -> RemainderPolicy {
        self.remainder_policy
    }
}

fn require_owner(owner_id: &str) -> ResultEngine<&str> {
    let trimmed = owner_id.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(
            "owner id must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: DatabaseConnection,
    max_installments: u32,
    remainder_policy: RemainderPolicy,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            max_installments: DEFAULT_MAX_INSTALLMENTS,
            remainder_policy: RemainderPolicy::default(),
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Largest accepted installment count for a single purchase.
    pub fn max_installments(mut self, max: u32) -> EngineBuilder {
        self.max_installments = max;
        self
    }

    /// Where the cents left over by a split go.
    pub fn remainder_policy(mut self, policy: RemainderPolicy) -> EngineBuilder {
        self.remainder_policy = policy;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        if self.max_installments < 1 {
            return Err(EngineError::Validation(
                "max_installments must be >= 1".to_string(),
            ));
        }
        Ok(Engine {
            database: self.database,
            max_installments: self.max_installments,
            remainder_policy: self.remainder_policy,
            owner_locks: OwnerLocks::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn owner_locks_are_dropped_after_release() {
        let locks = OwnerLocks::default();

        let alice = locks.acquire("alice").await;
        let bob = locks.acquire("bob").await;
        assert_eq!(locks.len(), 2);

        drop(alice);
        assert_eq!(locks.len(), 1);
        drop(bob);
        assert_eq!(locks.len(), 0);

        for _ in 0..3 {
            let _guard = locks.acquire("carol").await;
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn a_waiting_owner_keeps_the_entry_alive() {
        let locks = OwnerLocks::default();

        let first = locks.acquire("alice").await;
        let (second, ()) = tokio::join!(locks.acquire("alice"), async {
            tokio::task::yield_now().await;
            drop(first);
        });
        assert_eq!(locks.len(), 1);

        drop(second);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn only_lock_contention_is_retried() {
        assert!(!is_busy(&EngineError::Validation("nope".to_string())));
        assert!(!is_busy(&EngineError::Database(DbErr::Custom(
            "database is locked".to_string()
        ))));
        assert!(!is_busy(&EngineError::Allocation {
            installment: 2,
            count: 3,
            source: Box::new(EngineError::KeyNotFound("invoice not exists".to_string())),
        }));
    }
}
