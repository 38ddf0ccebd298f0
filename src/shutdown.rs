use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted by shutdown signal")]
pub struct Cancelled;

/// Receiving side of the process-wide shutdown flag.
///
/// Every suspension point of a run goes through [`Shutdown::guard`] so an
/// interrupt is observed between requests, during pacing sleeps and while a
/// request is in flight.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    open: bool,
}

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx, open: true }
    }

    /// A handle that never fires.
    #[cfg(test)]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx, open: false }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn guard<F: Future>(&mut self, future: F) -> Result<F::Output, Cancelled> {
        if self.is_triggered() {
            return Err(Cancelled);
        }
        tokio::pin!(future);

        loop {
            tokio::select! {
                output = &mut future => return Ok(output),
                changed = self.rx.changed(), if self.open => {
                    match changed {
                        Ok(()) => {
                            if *self.rx.borrow() {
                                info!("Shutdown signal received");
                                return Err(Cancelled);
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed; continuing without interrupt support");
                            self.open = false;
                        }
                    }
                }
            }
        }
    }

    pub async fn sleep(&mut self, duration: Duration) -> Result<(), Cancelled> {
        if duration.is_zero() {
            return if self.is_triggered() { Err(Cancelled) } else { Ok(()) };
        }
        self.guard(sleep(duration)).await
    }
}
