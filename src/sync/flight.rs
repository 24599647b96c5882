//! Single-flight guard keyed by project.
//!
//! At most one sync per project runs at a time, across every process that
//! shares the checkpoint store. The guard is a lease row in the store. A
//! second trigger for a busy project is rejected rather than queued, and a
//! lease left behind by a crashed process expires after its TTL.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::CheckpointStore;

/// Lifetime of a lease between renewals.
pub const DEFAULT_LEASE_TTL_SECS: i64 = 900;

/// Issues sync leases for projects out of a shared store.
pub struct ProjectLocks<S> {
    store: Arc<S>,
    ttl: Duration,
}

impl<S> Clone for ProjectLocks<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
        }
    }
}

/// Proof that the holder owns a project's sync lease.
///
/// The lease is released when the permit is dropped, including on panic
/// or task cancellation. If the release itself fails the lease simply
/// expires.
pub struct FlightPermit<S: CheckpointStore> {
    store: Arc<S>,
    project_key: String,
    holder: String,
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

impl<S: CheckpointStore> ProjectLocks<S> {
    #[must_use]
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Claim the lease for `project_key` under a fresh holder id.
    ///
    /// # Errors
    ///
    /// Returns `Error::SyncInProgress` if another holder has a live lease,
    /// or the store error if the lease table cannot be written.
    pub fn try_acquire(&self, project_key: &str) -> Result<FlightPermit<S>> {
        let holder = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + self.ttl;
        if !self.store.claim_lease(project_key, &holder, expires_at)? {
            return Err(Error::SyncInProgress {
                project: project_key.to_string(),
            });
        }
        debug!(project = project_key, %holder, "Sync lease acquired");
        Ok(FlightPermit {
            store: Arc::clone(&self.store),
            project_key: project_key.to_string(),
            holder,
            ttl: self.ttl,
            expires_at,
        })
    }
}

impl<S: CheckpointStore> FlightPermit<S> {
    /// Extend the lease once half of its lifetime has passed.
    ///
    /// # Errors
    ///
    /// Returns `Error::SyncInProgress` if the lease expired and another
    /// holder took the project over.
    pub fn keep_alive(&mut self) -> Result<()> {
        let now = Utc::now();
        if self.expires_at - now > self.ttl / 2 {
            return Ok(());
        }
        let expires_at = now + self.ttl;
        if !self
            .store
            .claim_lease(&self.project_key, &self.holder, expires_at)?
        {
            return Err(Error::SyncInProgress {
                project: self.project_key.clone(),
            });
        }
        self.expires_at = expires_at;
        Ok(())
    }
}

impl<S: CheckpointStore> Drop for FlightPermit<S> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lease(&self.project_key, &self.holder) {
            warn!(project = %self.project_key, error = %e, "Could not release sync lease");
        }
    }
}
