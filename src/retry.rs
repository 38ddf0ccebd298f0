use std::time::Duration;

use crate::client::{AliasService, ServiceError};
use crate::observer::{RunObserver, Stage};
use crate::shutdown::{Cancelled, Shutdown};

/// Vendor messages containing any of these (case-insensitive) mean the account
/// is inside its rate-limit window.
pub const RATE_LIMIT_KEYWORDS: [&str; 4] = ["limit", "maximum", "5 per hour", "too many"];

pub fn is_rate_limited(message: &str) -> bool {
    let lowered = message.to_lowercase();
    RATE_LIMIT_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Terminal result of acquiring one alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Success(String),
    RateLimited(String),
    Failed(String),
}

#[derive(Debug)]
struct StepFailure {
    stage: Stage,
    reason: String,
}

impl StepFailure {
    fn new(stage: Stage, error: ServiceError) -> Self {
        Self {
            stage,
            reason: error.reason(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Runs generate then reserve, starting over from generate on a transient
    /// failure. Rate-limit messages end the acquisition immediately.
    pub async fn acquire_one(
        &self,
        service: &dyn AliasService,
        observer: &dyn RunObserver,
        shutdown: &mut Shutdown,
    ) -> Result<AcquireOutcome, Cancelled> {
        let mut attempt = 0u32;
        loop {
            let failure = match self.attempt(service, observer, shutdown).await? {
                Ok(address) => return Ok(AcquireOutcome::Success(address)),
                Err(failure) => failure,
            };
            observer.step_failed(failure.stage, &failure.reason, attempt);

            if is_rate_limited(&failure.reason) {
                observer.rate_limited(failure.stage, &failure.reason);
                return Ok(AcquireOutcome::RateLimited(failure.reason));
            }
            if attempt >= self.max_retries {
                observer.gave_up(failure.stage, &failure.reason);
                return Ok(AcquireOutcome::Failed(failure.reason));
            }

            attempt += 1;
            observer.retry_scheduled(failure.stage, attempt, self.retry_delay);
            shutdown.sleep(self.retry_delay).await?;
        }
    }

    async fn attempt(
        &self,
        service: &dyn AliasService,
        observer: &dyn RunObserver,
        shutdown: &mut Shutdown,
    ) -> Result<Result<String, StepFailure>, Cancelled> {
        let address = match shutdown.guard(service.generate()).await? {
            Ok(address) => address,
            Err(err) => return Ok(Err(StepFailure::new(Stage::Generate, err))),
        };
        observer.alias_generated(&address);

        if let Err(err) = shutdown.guard(service.reserve(&address)).await? {
            return Ok(Err(StepFailure::new(Stage::Reserve, err)));
        }
        observer.alias_reserved(&address);
        Ok(Ok(address))
    }
}
