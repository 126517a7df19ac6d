// persona-core/src/runtime/pipeline.rs
// ============================================================================
// Module: Persona Pipeline
// Description: Bounded async queue with hash-partitioned workers.
// Purpose: Drive enrichment and resolution off the ingestion hot path.
// Dependencies: crate::core, crate::runtime::{audit, enrichment, resolution}, tokio
// ============================================================================

//! ## Overview
//! The pipeline owns one bounded queue per worker and routes events by a
//! hash of the profile id, preserving per-profile FIFO across workers.
//! Durability comes from the event log being written before enqueue; queue
//! contents are lost on restart by design. Workers log and swallow per-event
//! errors so one bad event does not stop the queue.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::Event;
use crate::core::ProfileId;
use crate::core::ServiceError;
use crate::runtime::audit::PipelineAuditEvent;
use crate::runtime::audit::PipelineAuditSink;
use crate::runtime::enrichment::EnrichmentEngine;
use crate::runtime::resolution::ResolutionEngine;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default bounded queue capacity per worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// Default worker count.
pub const DEFAULT_WORKERS: usize = 1;

/// Pipeline sizing.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of partitioned consumers.
    pub workers: usize,
    /// Bounded queue capacity per consumer.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Cloneable submission handle onto the pipeline queues.
#[derive(Clone)]
pub struct PipelineHandle {
    /// One bounded sender per worker partition.
    senders: Arc<Vec<mpsc::Sender<Event>>>,
}

impl PipelineHandle {
    /// Enqueues an event onto its profile partition, awaiting queue space
    /// when full (backpressure).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] when the pipeline has shut down.
    pub async fn submit(&self, event: Event) -> Result<(), ServiceError> {
        let partition = self.partition(&event.profile_id);
        self.senders[partition]
            .send(event)
            .await
            .map_err(|_| ServiceError::Internal("pipeline queue closed".to_string()))
    }

    /// Stable partition for a profile id.
    fn partition(&self, profile_id: &ProfileId) -> usize {
        let mut hasher = DefaultHasher::new();
        profile_id.hash(&mut hasher);
        usize::try_from(hasher.finish() % self.senders.len() as u64).unwrap_or(0)
    }
}

/// Async processing pipeline owning the worker tasks.
pub struct Pipeline {
    /// Submission handle.
    handle: PipelineHandle,
    /// Worker join handles.
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts the pipeline with one consumer per partition.
    #[must_use]
    pub fn start(
        enrichment: EnrichmentEngine,
        resolution: ResolutionEngine,
        audit: Arc<dyn PipelineAuditSink>,
        config: &PipelineConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (sender, receiver) = mpsc::channel(capacity);
            senders.push(sender);
            handles.push(tokio::spawn(worker_loop(
                receiver,
                enrichment.clone(),
                resolution.clone(),
                Arc::clone(&audit),
            )));
        }
        Self {
            handle: PipelineHandle {
                senders: Arc::new(senders),
            },
            workers: handles,
        }
    }

    /// Returns a submission handle.
    #[must_use]
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Waits for the workers to drain. The queues close once every
    /// [`PipelineHandle`] clone has been dropped.
    pub async fn shutdown(self) {
        drop(self.handle);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Single consumer: enrich, then resolve, logging failures per event.
async fn worker_loop(
    mut receiver: mpsc::Receiver<Event>,
    enrichment: EnrichmentEngine,
    resolution: ResolutionEngine,
    audit: Arc<dyn PipelineAuditSink>,
) {
    while let Some(event) = receiver.recv().await {
        let enriched = match enrichment.process(&event).await {
            Ok(profile) => profile,
            Err(error) => {
                audit.record(
                    &PipelineAuditEvent::new("enrichment", event.profile_id.as_str(), "failed")
                        .with_event(event.event_id.as_str())
                        .with_detail(error.to_string()),
                );
                continue;
            }
        };
        if let Err(error) = resolution.unify(&enriched) {
            audit.record(
                &PipelineAuditEvent::new("resolution", enriched.profile_id.as_str(), "failed")
                    .with_event(event.event_id.as_str())
                    .with_detail(error.to_string()),
            );
        }
    }
}
