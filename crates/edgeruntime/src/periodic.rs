use crate::control::{ControlInterface, ControlRegistry, ParamType};
use edgecore::{Result, RuntimeError, StageError, TimeUnit};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Control type periodic schedules register under.
pub const PERIODIC_CONTROL_TYPE: &str = "periodic";

type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<(), StageError>> + Send + Sync>;

struct Schedule {
    period: u64,
    unit: TimeUnit,
    token: Option<CancellationToken>,
    control_id: Option<String>,
}

/// Runs a fetch function at a fixed rate on a tokio runtime.
///
/// The first run after [`start`](PeriodicScheduler::start) is immediate. A
/// period change cancels the current schedule and starts a new one whose
/// first run is one new period later. Cancelling never waits for a fetch in
/// progress, so fetches of the old and new schedule may overlap.
///
/// A fetch that fails ends the schedule; the failure is reported through
/// [`fault`](PeriodicScheduler::fault).
pub struct PeriodicScheduler {
    schedule: Mutex<Schedule>,
    fetch: FetchFn,
    scheduler: tokio::runtime::Handle,
    faults: Arc<watch::Sender<Option<StageError>>>,
}

impl PeriodicScheduler {
    pub fn new<F, Fut>(
        period: u64,
        unit: TimeUnit,
        scheduler: tokio::runtime::Handle,
        fetch: F,
    ) -> Result<Arc<Self>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), StageError>> + Send + 'static,
    {
        if period == 0 {
            return Err(RuntimeError::InvalidArgument(
                "period must be positive".to_string(),
            ));
        }
        let fetch: FetchFn = Arc::new(move || Box::pin(fetch()));
        let (faults, _) = watch::channel(None);
        Ok(Arc::new(Self {
            schedule: Mutex::new(Schedule {
                period,
                unit,
                token: None,
                control_id: None,
            }),
            fetch,
            scheduler,
            faults: Arc::new(faults),
        }))
    }

    /// Operations remote callers may invoke on a periodic schedule.
    pub fn control_interface() -> ControlInterface<PeriodicScheduler> {
        ControlInterface::new("PeriodicControl")
            .operation(
                "setPeriod",
                [ParamType::Long],
                |periodic: Arc<PeriodicScheduler>, args| async move {
                    periodic.set_period(args.long(0)?)
                },
            )
            .operation(
                "setPeriod",
                [ParamType::Long, ParamType::enumeration::<TimeUnit>()],
                |periodic: Arc<PeriodicScheduler>, args| async move {
                    periodic.set_period_in(args.long(0)?, args.enumeration::<TimeUnit>(1)?)
                },
            )
    }

    pub fn period(&self) -> u64 {
        self.lock().period
    }

    pub fn unit(&self) -> TimeUnit {
        self.lock().unit
    }

    pub fn is_scheduled(&self) -> bool {
        self.lock().token.is_some()
    }

    /// Publish the control under `periodic:<id>` (when a registry is given)
    /// and schedule the first fetch immediately.
    pub fn start(self: &Arc<Self>, controls: Option<&Arc<ControlRegistry>>, id: &str) -> Result<()> {
        let mut schedule = self.lock();
        if schedule.token.is_some() {
            return Err(RuntimeError::InvalidArgument(format!(
                "periodic schedule {} already started",
                id
            )));
        }

        if let Some(controls) = controls {
            let control_id = controls.register_control(
                PERIODIC_CONTROL_TYPE,
                id,
                None,
                Self::control_interface(),
                self.clone(),
            )?;
            schedule.control_id = Some(control_id);
        }

        let period = schedule.unit.to_duration(schedule.period);
        schedule.token = Some(self.schedule(Duration::ZERO, period));
        tracing::info!("Started periodic {} every {} {}", id, schedule.period, schedule.unit);
        Ok(())
    }

    /// Change the period, keeping the unit.
    pub fn set_period(&self, period: i64) -> Result<()> {
        let unit = self.unit();
        self.set_period_in(period, unit)
    }

    /// Change the period and unit. The next fetch happens one new period
    /// after the change.
    pub fn set_period_in(&self, period: i64, unit: TimeUnit) -> Result<()> {
        let period = u64::try_from(period)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| RuntimeError::InvalidArgument(format!("period {} must be positive", period)))?;

        let mut schedule = self.lock();
        if schedule.period == period && schedule.unit == unit {
            return Ok(());
        }

        schedule.period = period;
        schedule.unit = unit;
        if let Some(token) = schedule.token.take() {
            token.cancel();
            let period = unit.to_duration(period);
            schedule.token = Some(self.schedule(period, period));
        }
        tracing::info!("Periodic period changed to {} {}", period, unit);
        Ok(())
    }

    /// Cancel the schedule and withdraw the control.
    pub fn stop(&self, controls: Option<&Arc<ControlRegistry>>) {
        let mut schedule = self.lock();
        if let Some(token) = schedule.token.take() {
            token.cancel();
        }
        if let (Some(controls), Some(control_id)) = (controls, schedule.control_id.take()) {
            controls.unregister(&control_id);
        }
    }

    /// Resolves with the failure that ended the schedule.
    pub async fn fault(&self) -> StageError {
        let mut faults = self.faults.subscribe();
        let fault = faults
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|fault| (*fault).clone());
        match fault {
            Some(fault) => fault,
            // `self` holds the sender, so the channel never closes first.
            None => std::future::pending().await,
        }
    }

    /// Run the fetch function once.
    pub async fn run(&self) -> std::result::Result<(), StageError> {
        (self.fetch)().await
    }

    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule(&self, initial_delay: Duration, period: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let fetch = self.fetch.clone();
        let faults = self.faults.clone();

        self.scheduler.spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + initial_delay, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticks.tick() => {
                        tracing::trace!("Periodic fetch");
                        if let Err(e) = fetch().await {
                            tracing::error!("Periodic fetch failed, ending schedule: {}", e);
                            faults.send_replace(Some(e));
                            break;
                        }
                    }
                }
            }
        });
        token
    }
}
