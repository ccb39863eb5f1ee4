use crate::domain::models::{DatetimeGreeting, ProductivitySummary};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_client::{PlannerApi, ProductivitySource};
use log::{error, warn};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, sleep, Duration as TokioDuration, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 30_000,
        }
    }
}

/// Runs `job` immediately and then every `every` until the handle is aborted.
fn spawn_every<F, Fut>(every: TokioDuration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            job().await;
        }
    })
}

/// Background refresh loops of the dashboard widgets. Dropping it stops them.
pub struct DashboardRefresh {
    handles: Vec<JoinHandle<()>>,
}

impl DashboardRefresh {
    pub fn new(handles: Vec<JoinHandle<()>>) -> Self {
        Self { handles }
    }
}

impl Drop for DashboardRefresh {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

pub struct ProductivityService<A>
where
    A: PlannerApi,
{
    api: Arc<A>,
    latest: Mutex<Option<ProductivitySummary>>,
}

impl<A> ProductivityService<A>
where
    A: PlannerApi,
{
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            latest: Mutex::new(None),
        }
    }

    pub fn latest(&self) -> Option<ProductivitySummary> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    /// Never fails: when both endpoints are unavailable the widgets show zeros.
    pub async fn refresh(&self) -> ProductivitySummary {
        let summary = self.fetch().await;
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(summary.clone());
        }
        summary
    }

    async fn fetch(&self) -> ProductivitySummary {
        let primary_error = match self.api.productivity(ProductivitySource::Primary).await {
            Ok(summary) => return summary,
            Err(error) => error,
        };
        warn!("primary productivity endpoint failed, trying legacy: {primary_error}");

        match self.api.productivity(ProductivitySource::Legacy).await {
            Ok(summary) => summary,
            Err(legacy_error) => {
                error!(
                    "productivity unavailable: primary={primary_error}; legacy={legacy_error}"
                );
                ProductivitySummary::default()
            }
        }
    }
}

impl<A> ProductivityService<A>
where
    A: PlannerApi + 'static,
{
    pub fn spawn_periodic(self: Arc<Self>, every: TokioDuration) -> JoinHandle<()> {
        spawn_every(every, move || {
            let service = Arc::clone(&self);
            async move {
                service.refresh().await;
            }
        })
    }
}

pub struct DatetimeRefresher<A>
where
    A: PlannerApi,
{
    api: Arc<A>,
    retry_policy: RetryPolicy,
    latest: Mutex<Option<DatetimeGreeting>>,
}

impl<A> DatetimeRefresher<A>
where
    A: PlannerApi,
{
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            retry_policy: RetryPolicy::default(),
            latest: Mutex::new(None),
        }
    }

    pub fn latest(&self) -> Option<DatetimeGreeting> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// `Ok(None)` means the server answered `success: false`; that case is
    /// logged and not retried. Transport failures are retried after a fixed delay.
    pub async fn refresh(&self) -> Result<Option<DatetimeGreeting>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0_u8;

        loop {
            attempt += 1;
            match self.api.current_datetime().await {
                Ok(response) => {
                    let greeting = response.greeting();
                    match &greeting {
                        Some(current) => {
                            if let Ok(mut latest) = self.latest.lock() {
                                *latest = Some(current.clone());
                            }
                        }
                        None => warn!(
                            "datetime refresh rejected: {}",
                            response.error.as_deref().unwrap_or("unknown error")
                        ),
                    }
                    return Ok(greeting);
                }
                Err(error) if attempt < max_attempts => {
                    warn!(
                        "datetime refresh failed (attempt {attempt}/{max_attempts}), retrying in {}ms: {error}",
                        self.retry_policy.delay_ms
                    );
                    sleep(TokioDuration::from_millis(self.retry_policy.delay_ms)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub async fn on_visibility_change(
        &self,
        visible: bool,
    ) -> Result<Option<DatetimeGreeting>, InfraError> {
        if !visible {
            return Ok(None);
        }
        self.refresh().await
    }
}

impl<A> DatetimeRefresher<A>
where
    A: PlannerApi + 'static,
{
    pub fn spawn_periodic(self: Arc<Self>, every: TokioDuration) -> JoinHandle<()> {
        spawn_every(every, move || {
            let refresher = Arc::clone(&self);
            async move {
                if let Err(refresh_error) = refresher.refresh().await {
                    warn!("periodic datetime refresh failed: {refresh_error}");
                }
            }
        })
    }
}
