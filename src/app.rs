use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::client::{AliasService, HmeClient};
use crate::config::{GeneratorConfig, hours_to_duration};
use crate::listing::{self, ListingQuery};
use crate::models::alias::AliasRecord;
use crate::observer::{RunObserver, TracingObserver};
use crate::scheduler::{BatchScheduler, GenerationRequest, GenerationRun};
use crate::shutdown::Shutdown;
use crate::store::ResultStore;
use crate::zone::Zone;

/// Per-invocation overrides of the configured generation parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOverrides {
    pub batch_size: Option<usize>,
    pub delay_hours: Option<f64>,
    pub max_retries: Option<u32>,
}

/// One vendor session plus everything a command needs around it.
pub struct App {
    config: GeneratorConfig,
    zone: Zone,
    service: Arc<dyn AliasService>,
    observer: Arc<dyn RunObserver>,
    store: ResultStore,
}

impl App {
    pub fn connect(config: GeneratorConfig) -> Result<Self> {
        let cookie = config.read_cookie()?;
        let client = HmeClient::new(&config, cookie.as_deref())
            .context("Failed to initialize vendor client")?;
        info!(
            "Vendor session ready (request timeout {}s)",
            client.timeout().as_secs()
        );
        Self::with_service(config, Arc::new(client), Arc::new(TracingObserver))
    }

    pub fn with_service(
        config: GeneratorConfig,
        service: Arc<dyn AliasService>,
        observer: Arc<dyn RunObserver>,
    ) -> Result<Self> {
        let zone = config.zone()?;
        let store = ResultStore::new(
            config.generated_emails_file.clone(),
            config.backup_dir.clone(),
            zone,
        );
        Ok(Self {
            config,
            zone,
            service,
            observer,
            store,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn request(&self, total_count: usize, overrides: GenerateOverrides) -> Result<GenerationRequest> {
        let inter_batch_delay = match overrides.delay_hours {
            Some(hours) => hours_to_duration(hours)?,
            None => self.config.inter_batch_delay()?,
        };
        let request = GenerationRequest {
            total_count,
            batch_size: overrides
                .batch_size
                .unwrap_or(self.config.max_concurrent_tasks),
            inter_item_delay: self.config.inter_item_delay()?,
            inter_batch_delay,
            max_retries: overrides.max_retries.unwrap_or(self.config.max_retries),
            retry_delay: self.config.retry_delay()?,
            stall_limit: self.config.stall_limit,
        };
        request.validate()?;
        Ok(request)
    }

    /// Runs the scheduler and persists whatever it collected, including the
    /// partial result of an interrupted run.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        shutdown: &mut Shutdown,
    ) -> GenerationRun {
        let scheduler = BatchScheduler::new(Arc::clone(&self.service), Arc::clone(&self.observer));
        let run = scheduler.run(request, shutdown).await;

        if run.collected.is_empty() {
            warn!("No aliases were generated");
            return run;
        }
        match self.store.persist(&run.collected).await {
            Ok(report) => {
                if let Some(backup) = &report.backup {
                    info!("Previous results kept at {}", backup.display());
                }
                info!("{} aliases written to {}", report.written, report.path.display());
            }
            Err(err) => error!(
                "Failed to save {} aliases to {}: {err}. Reserved aliases: {}",
                run.completed(),
                self.store.results_file().display(),
                run.collected.join(", ")
            ),
        }
        run
    }

    pub async fn list(
        &self,
        query: &ListingQuery,
        save: bool,
        shutdown: &mut Shutdown,
    ) -> Result<Vec<AliasRecord>> {
        let records = shutdown
            .guard(listing::fetch(self.service.as_ref(), query, self.zone))
            .await?
            .context("Failed to list aliases")?;

        if records.is_empty() {
            println!("No aliases match the given filters.");
        } else {
            print!("{}", listing::render_table(&records));
        }

        if save && !records.is_empty() {
            match listing::export(&records, &self.config.export_dir, self.zone).await {
                Ok(path) => info!("Saved {} aliases to {}", records.len(), path.display()),
                Err(err) => error!("{err}"),
            }
        }
        Ok(records)
    }
}
