// persona-core/src/runtime/ingest.rs
// ============================================================================
// Module: Persona Ingestion Gate
// Description: Per-event entry point into the ingestion pipeline.
// Purpose: Ensure the profile exists, persist the event, enqueue processing.
// Dependencies: crate::core, crate::interfaces, crate::runtime::{lock, pipeline}
// ============================================================================

//! ## Overview
//! The gate admits one event at a time: it validates and normalizes the
//! event, upserts a profile skeleton behind the per-profile writer lock with
//! insert-only semantics, waits for the profile to become visible, persists
//! the event, and hands it to the async pipeline through a bounded queue.
//! The caller returns after enqueue, not after processing; a full queue
//! blocks the caller as backpressure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::core::Event;
use crate::core::Profile;
use crate::core::ProfileId;
use crate::core::ServiceError;
use crate::core::Timestamp;
use crate::interfaces::EventStore;
use crate::interfaces::ProfileStore;
use crate::runtime::lock::LockManager;
use crate::runtime::pipeline::PipelineHandle;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attempts in the post-upsert visibility poll.
const VISIBILITY_POLL_ATTEMPTS: u32 = 10;
/// Delay between visibility poll attempts.
const VISIBILITY_POLL_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// SECTION: Ingestion Gate
// ============================================================================

/// Per-event ingestion entry point.
#[derive(Clone)]
pub struct IngestionGate {
    /// Profile collection.
    profiles: Arc<dyn ProfileStore>,
    /// Event log.
    events: Arc<dyn EventStore>,
    /// Lock manager enforcing single-writer semantics.
    locks: LockManager,
    /// Handle onto the async processing queue.
    pipeline: PipelineHandle,
}

impl IngestionGate {
    /// Creates an ingestion gate.
    #[must_use]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        events: Arc<dyn EventStore>,
        locks: LockManager,
        pipeline: PipelineHandle,
    ) -> Self {
        Self {
            profiles,
            events,
            locks,
            pipeline,
        }
    }

    /// Admits one event: ensures the profile exists, persists the event, and
    /// enqueues it for async enrichment.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidEvent`] on admission failure,
    /// [`ServiceError::LockContention`] when the profile lock cannot be
    /// acquired, and [`ServiceError::Store`] on persistence failure.
    pub async fn ingest(&self, mut event: Event) -> Result<(), ServiceError> {
        event.validate()?;
        event.normalize();

        self.ensure_profile(&event.profile_id).await?;
        self.events.append(&event)?;
        self.pipeline.submit(event).await
    }

    /// Upserts the profile skeleton behind the writer lock and waits for it
    /// to become visible, tolerating eventual read-after-write.
    async fn ensure_profile(&self, profile_id: &ProfileId) -> Result<(), ServiceError> {
        let guard = self.locks.acquire_profile(profile_id).await?;
        let skeleton = Profile::skeleton(profile_id.clone(), Timestamp::now());
        let result = self.insert_and_wait(&skeleton).await;
        guard.release()?;
        result
    }

    /// Insert-only upsert plus bounded visibility poll.
    async fn insert_and_wait(&self, skeleton: &Profile) -> Result<(), ServiceError> {
        self.profiles.insert_if_absent(skeleton)?;
        for attempt in 0..VISIBILITY_POLL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(VISIBILITY_POLL_DELAY).await;
            }
            if self.profiles.find(&skeleton.profile_id)?.is_some() {
                return Ok(());
            }
        }
        Err(ServiceError::Internal(format!(
            "profile {} not visible after insert",
            skeleton.profile_id
        )))
    }
}
