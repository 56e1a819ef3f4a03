use async_trait::async_trait;
use edgecore::{StageError, TimeUnit, Tuple};
use edgeruntime::{Oplet, OpletContext, PeriodicScheduler};
use std::sync::Arc;

/// Polled by a [`PeriodicSource`]. `Ok(None)` means nothing to emit this
/// time round.
pub type FetchFn = Arc<dyn Fn() -> Result<Option<Tuple>, StageError> + Send + Sync>;

/// Source polling a fetch function at a fixed, remotely adjustable rate.
///
/// While running, the schedule is published as a `periodic` control so its
/// period can be changed with `setPeriod`. The source runs until the job is
/// cancelled or a fetch fails.
pub struct PeriodicSource {
    period: u64,
    unit: TimeUnit,
    fetch: FetchFn,
    scheduler: Option<Arc<PeriodicScheduler>>,
}

impl PeriodicSource {
    pub fn new<F>(period: u64, unit: TimeUnit, fetch: F) -> Self
    where
        F: Fn() -> Result<Option<Tuple>, StageError> + Send + Sync + 'static,
    {
        Self {
            period,
            unit,
            fetch: Arc::new(fetch),
            scheduler: None,
        }
    }
}

#[async_trait]
impl Oplet for PeriodicSource {
    fn kind(&self) -> &str {
        "source.periodic"
    }

    async fn initialize(&mut self, ctx: &OpletContext) -> Result<(), StageError> {
        let fetch = self.fetch.clone();
        let emitter = ctx.emitter();
        let scheduler = PeriodicScheduler::new(
            self.period,
            self.unit,
            ctx.scheduler().clone(),
            move || {
                let fetch = fetch.clone();
                let emitter = emitter.clone();
                async move {
                    if let Some(tuple) = fetch()? {
                        emitter.submit(tuple).await?;
                    }
                    Ok(())
                }
            },
        )
        .map_err(|e| StageError::InitializationFailed(e.to_string()))?;

        self.scheduler = Some(scheduler);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError> {
        let Some(scheduler) = self.scheduler.clone() else {
            return Err(StageError::InitializationFailed(
                "periodic source was not initialized".to_string(),
            ));
        };

        let controls = ctx.services().controls.clone();
        scheduler
            .start(controls.as_ref(), &ctx.uniquify("periodic"))
            .map_err(|e| StageError::Failed(e.to_string()))?;

        let outcome = tokio::select! {
            _ = ctx.cancellation().cancelled() => Ok(()),
            fault = scheduler.fault() => Err(fault),
        };
        scheduler.stop(controls.as_ref());
        outcome
    }

    async fn close(&mut self, ctx: &OpletContext) -> Result<(), StageError> {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop(ctx.services().controls.as_ref());
        }
        Ok(())
    }
}
