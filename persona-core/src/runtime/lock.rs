// persona-core/src/runtime/lock.rs
// ============================================================================
// Module: Persona Lock Manager
// Description: Named, expiring, fenced advisory locks with retry policy.
// Purpose: Enforce the single-writer-per-profile concurrency discipline.
// Dependencies: crate::core, crate::interfaces, tokio
// ============================================================================

//! ## Overview
//! Locks are persisted through a [`LockStore`] so they survive process
//! restarts; a lock whose expiry has passed is free. The manager layers the
//! retry policy on top: profile-lock acquisition retries a bounded number of
//! times with fixed back-off and surfaces [`ServiceError::LockContention`]
//! when exhausted, while the unification lock is single-attempt. There is no
//! fairness guarantee. TTLs must exceed the longest critical section and are
//! configurable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::core::ProfileId;
use crate::core::ServiceError;
use crate::core::Timestamp;
use crate::interfaces::LockStore;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Key prefix for per-profile writer locks.
const PROFILE_LOCK_PREFIX: &str = "lock:profile:";
/// Key prefix for unification critical-section locks.
const UNIFY_LOCK_PREFIX: &str = "lock:unify:";

/// Lock TTLs and retry policy.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// TTL for `lock:profile` keys.
    pub profile_ttl: Duration,
    /// TTL for `lock:unify` keys.
    pub unify_ttl: Duration,
    /// Maximum acquisition attempts for profile locks.
    pub max_attempts: u32,
    /// Back-off between acquisition attempts.
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            profile_ttl: Duration::from_secs(1),
            unify_ttl: Duration::from_secs(5),
            max_attempts: 10,
            retry_delay: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// SECTION: Lock Manager
// ============================================================================

/// Advisory lock manager over a persisted lock store.
#[derive(Clone)]
pub struct LockManager {
    /// Persisted lock backend.
    store: Arc<dyn LockStore>,
    /// TTL and retry configuration.
    config: LockConfig,
}

impl LockManager {
    /// Creates a lock manager with the given backend and configuration.
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Acquires the per-profile writer lock, retrying per policy.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::LockContention`] when every attempt finds the
    /// lock held, or [`ServiceError::Store`] on backend failure.
    pub async fn acquire_profile(&self, profile_id: &ProfileId) -> Result<LockGuard, ServiceError> {
        let key = format!("{PROFILE_LOCK_PREFIX}{profile_id}");
        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            if let Some(guard) = self.try_acquire(&key, self.config.profile_ttl)? {
                return Ok(guard);
            }
        }
        Err(ServiceError::LockContention(format!(
            "could not acquire profile lock for {profile_id} after {} attempts",
            self.config.max_attempts
        )))
    }

    /// Attempts the unification lock once. `None` means another unifier is in
    /// flight and the caller should exit without work.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on backend failure.
    pub fn try_acquire_unify(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Option<LockGuard>, ServiceError> {
        let key = format!("{UNIFY_LOCK_PREFIX}{profile_id}");
        Ok(self.try_acquire(&key, self.config.unify_ttl)?)
    }

    /// Single conditional-upsert acquisition attempt.
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockGuard>, ServiceError> {
        let now_ms = Timestamp::now_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_ms = now_ms.saturating_add(ttl_ms);
        let fence = self.store.try_acquire(key, expires_at_ms, now_ms)?;
        Ok(fence.map(|fence| LockGuard {
            store: Arc::clone(&self.store),
            key: key.to_string(),
            fence,
            released: false,
        }))
    }
}

// ============================================================================
// SECTION: Lock Guard
// ============================================================================

/// Held lock released on drop.
pub struct LockGuard {
    /// Persisted lock backend.
    store: Arc<dyn LockStore>,
    /// Lock key.
    key: String,
    /// Fence token assigned at acquisition.
    fence: u64,
    /// Whether release already ran.
    released: bool,
}

impl LockGuard {
    /// Returns the fence token.
    #[must_use]
    pub const fn fence(&self) -> u64 {
        self.fence
    }

    /// Releases the lock explicitly. Release is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on backend failure.
    pub fn release(mut self) -> Result<(), ServiceError> {
        self.released = true;
        Ok(self.store.release(&self.key)?)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            // Best effort; an unreleased lock expires with its TTL.
            let _ = self.store.release(&self.key);
        }
    }
}
