//! At most one plagiarism check per course.

use crate::error::{PlagiarismError, Result};
use async_trait::async_trait;
use db::models::plagiarism_check_lock;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Atomic per-course flag shared by every process that runs checks.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Sets the flag for `course_id` unless it is already set. Returns whether it was set.
    async fn try_acquire(&self, course_id: i64, holder: &str) -> Result<bool>;

    async fn release(&self, course_id: i64, holder: &str) -> Result<()>;
}

/// Lock table in the shared database, with expiry for crashed holders.
#[derive(Clone)]
pub struct DbLockStore {
    db: DatabaseConnection,
    ttl: chrono::Duration,
}

impl DbLockStore {
    pub fn new(db: DatabaseConnection, ttl: chrono::Duration) -> Self {
        Self { db, ttl }
    }

    pub fn from_config(db: DatabaseConnection) -> Self {
        let secs = i64::try_from(util::config::check_lock_ttl_secs()).unwrap_or(i64::MAX / 1000);
        Self::new(db, chrono::Duration::seconds(secs))
    }
}

#[async_trait]
impl LockStore for DbLockStore {
    async fn try_acquire(&self, course_id: i64, holder: &str) -> Result<bool> {
        Ok(plagiarism_check_lock::Entity::try_acquire(&self.db, course_id, holder, self.ttl).await?)
    }

    async fn release(&self, course_id: i64, holder: &str) -> Result<()> {
        if !plagiarism_check_lock::Entity::release(&self.db, course_id, holder).await? {
            warn!(course_id, holder, "Plagiarism lock was already gone on release");
        }
        Ok(())
    }
}

/// Process-local lock store for single-instance runs and tests.
#[derive(Default)]
pub struct InMemoryLockStore {
    held: Mutex<HashMap<i64, String>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, course_id: i64) -> bool {
        self.held
            .lock()
            .map(|h| h.contains_key(&course_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(&self, course_id: i64, holder: &str) -> Result<bool> {
        let mut held = self.held.lock().map_err(|_| poisoned())?;
        if held.contains_key(&course_id) {
            return Ok(false);
        }
        held.insert(course_id, holder.to_string());
        Ok(true)
    }

    async fn release(&self, course_id: i64, holder: &str) -> Result<()> {
        let mut held = self.held.lock().map_err(|_| poisoned())?;
        if held.get(&course_id).is_some_and(|h| h == holder) {
            held.remove(&course_id);
        }
        Ok(())
    }
}

fn poisoned() -> PlagiarismError {
    PlagiarismError::Io(std::io::Error::other("lock store mutex poisoned"))
}

#[derive(Clone)]
pub struct ExclusivityGate {
    store: Arc<dyn LockStore>,
}

impl ExclusivityGate {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Enters the gate for `course_id` or fails with `Conflict`.
    pub async fn try_enter(&self, course_id: i64) -> Result<GateGuard> {
        let holder = uuid::Uuid::new_v4().to_string();
        if !self.store.try_acquire(course_id, &holder).await? {
            debug!(course_id, "Plagiarism check already running");
            return Err(PlagiarismError::Conflict { course_id });
        }
        Ok(GateGuard {
            store: Arc::clone(&self.store),
            course_id,
            holder,
            released: false,
        })
    }
}

/// Proof of being inside the gate.
///
/// Call `leave` on every path. If the guard is dropped instead (panic,
/// cancelled future), the release is spawned onto the runtime.
#[must_use = "the gate stays closed until `leave` is called"]
pub struct GateGuard {
    store: Arc<dyn LockStore>,
    course_id: i64,
    holder: String,
    released: bool,
}

impl GateGuard {
    pub fn course_id(&self) -> i64 {
        self.course_id
    }

    pub async fn leave(mut self) {
        self.released = true;
        if let Err(e) = self.store.release(self.course_id, &self.holder).await {
            error!(course_id = self.course_id, error = %e, "Failed to release plagiarism lock");
        }
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let course_id = self.course_id;
        let holder = std::mem::take(&mut self.holder);
        warn!(course_id, "Gate guard dropped without leave; releasing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.release(course_id, &holder).await {
                        error!(course_id, error = %e, "Failed to release plagiarism lock");
                    }
                });
            }
            Err(_) => error!(course_id, "No runtime to release plagiarism lock"),
        }
    }
}
