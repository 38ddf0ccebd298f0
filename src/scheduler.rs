//! Paced bulk generation.
//!
//! The scheduler walks the requested total in batches, acquiring aliases one at a
//! time through [`RetryPolicy`]. Requests are strictly sequential: the vendor caps
//! successful reservations per account per hour, so fanning out would only reach
//! that cap sooner.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::AliasService;
use crate::observer::RunObserver;
use crate::retry::{AcquireOutcome, RetryPolicy};
use crate::shutdown::{Cancelled, Shutdown};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    #[error("batch size must be positive")]
    ZeroBatchSize,
    #[error("stall limit must be positive when set")]
    ZeroStallLimit,
}

/// Parameters of one generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub total_count: usize,
    pub batch_size: usize,
    pub inter_item_delay: Duration,
    pub inter_batch_delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Stop after this many consecutive batches without a single success.
    /// `None` keeps going until the total is reached or the run is interrupted.
    pub stall_limit: Option<u32>,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.batch_size == 0 {
            return Err(InvalidRequest::ZeroBatchSize);
        }
        if self.stall_limit == Some(0) {
            return Err(InvalidRequest::ZeroStallLimit);
        }
        Ok(())
    }
}

/// Accumulated state of a run, handed back to the caller for persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRun {
    pub total: usize,
    pub remaining: usize,
    /// Reserved aliases in completion order.
    pub collected: Vec<String>,
    pub cancelled: bool,
    pub stalled: bool,
}

impl GenerationRun {
    fn new(total: usize) -> Self {
        Self {
            total,
            remaining: total,
            ..Self::default()
        }
    }

    pub fn completed(&self) -> usize {
        self.collected.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    fn absorb(&mut self, batch: Vec<String>) {
        assert!(
            batch.len() <= self.remaining,
            "Batch overshot the remaining count"
        );
        self.remaining -= batch.len();
        self.collected.extend(batch);
    }
}

pub struct BatchScheduler {
    service: Arc<dyn AliasService>,
    observer: Arc<dyn RunObserver>,
}

impl BatchScheduler {
    pub fn new(service: Arc<dyn AliasService>, observer: Arc<dyn RunObserver>) -> Self {
        Self { service, observer }
    }

    pub async fn run(&self, request: &GenerationRequest, shutdown: &mut Shutdown) -> GenerationRun {
        assert!(request.batch_size > 0, "Batch size must be positive");
        let policy = RetryPolicy::new(request.max_retries, request.retry_delay);
        let mut run = GenerationRun::new(request.total_count);
        let mut idle_batches = 0u32;

        info!(
            "Starting generation of {} aliases in batches of {}",
            request.total_count, request.batch_size
        );

        while run.remaining > 0 {
            let batch_size = request.batch_size.min(run.remaining);
            self.observer.batch_started(batch_size, run.remaining);

            let mut batch = Vec::with_capacity(batch_size);
            let interrupted = self
                .run_batch(&policy, batch_size, request.inter_item_delay, &mut batch, shutdown)
                .await
                .is_err();
            let produced = batch.len();
            run.absorb(batch);
            self.observer.progress(run.completed(), run.total);

            if interrupted {
                run.cancelled = true;
                break;
            }

            if produced == 0 {
                idle_batches += 1;
                if request.stall_limit.is_some_and(|limit| idle_batches >= limit) {
                    warn!("No alias reserved in {idle_batches} consecutive batches; stopping run");
                    run.stalled = true;
                    break;
                }
            } else {
                idle_batches = 0;
            }

            if run.remaining > 0 {
                self.observer.cooling_down(request.inter_batch_delay);
                if shutdown.sleep(request.inter_batch_delay).await.is_err() {
                    run.cancelled = true;
                    break;
                }
            }
        }

        if run.cancelled {
            warn!(
                "Run interrupted with {}/{} aliases reserved",
                run.completed(),
                run.total
            );
        } else {
            info!("Run finished with {}/{} aliases reserved", run.completed(), run.total);
        }
        run
    }

    async fn run_batch(
        &self,
        policy: &RetryPolicy,
        batch_size: usize,
        inter_item_delay: Duration,
        batch: &mut Vec<String>,
        shutdown: &mut Shutdown,
    ) -> Result<(), Cancelled> {
        for _ in 0..batch_size {
            let outcome = policy
                .acquire_one(self.service.as_ref(), self.observer.as_ref(), shutdown)
                .await?;
            if let AcquireOutcome::Success(address) = outcome {
                batch.push(address);
            }
            shutdown.sleep(inter_item_delay).await?;
        }
        Ok(())
    }
}
