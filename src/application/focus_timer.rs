use crate::application::dashboard::ProductivityService;
use crate::domain::models::{TimerBlockReport, TimerMode, TimerState};
use crate::domain::timer::{
    NextBlock, PresetMinutes, StartOutcome, TickOutcome, TimerPreset, TimerSession,
    MAX_BLOCK_MINUTES,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_client::PlannerApi;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub mode: TimerMode,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub display: String,
    pub progress: f64,
    pub completed_blocks: u32,
    pub cycle: u32,
}

impl TimerSnapshot {
    fn of(session: &TimerSession) -> Self {
        Self {
            state: session.state(),
            mode: session.mode(),
            remaining_seconds: session.remaining_seconds(),
            total_seconds: session.total_seconds(),
            display: session.display(),
            progress: session.progress(),
            completed_blocks: session.completed_blocks(),
            cycle: session.cycle(),
        }
    }
}

/// Outward effects of the timer. Implementations must not block.
pub trait TimerEffects: Send + Sync {
    fn display(&self, snapshot: &TimerSnapshot);
    fn warning(&self, remaining_seconds: u32);
    fn completed(&self, mode: TimerMode, next: NextBlock);
    fn request_notification_permission(&self);
    fn block_reported(&self, _report: &TimerBlockReport) {}
}

pub struct TimerController<A, E>
where
    A: PlannerApi + 'static,
    E: TimerEffects + 'static,
{
    session: Arc<Mutex<TimerSession>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    reports: Arc<Mutex<Vec<JoinHandle<()>>>>,
    permission_requested: Arc<AtomicBool>,
    api: Arc<A>,
    effects: Arc<E>,
    productivity: Option<Arc<ProductivityService<A>>>,
    presets: PresetMinutes,
    tick_interval: Duration,
}

impl<A, E> Clone for TimerController<A, E>
where
    A: PlannerApi + 'static,
    E: TimerEffects + 'static,
{
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            ticker: Arc::clone(&self.ticker),
            reports: Arc::clone(&self.reports),
            permission_requested: Arc::clone(&self.permission_requested),
            api: Arc::clone(&self.api),
            effects: Arc::clone(&self.effects),
            productivity: self.productivity.clone(),
            presets: self.presets.clone(),
            tick_interval: self.tick_interval,
        }
    }
}

impl<A, E> TimerController<A, E>
where
    A: PlannerApi + 'static,
    E: TimerEffects + 'static,
{
    pub fn new(session: TimerSession, api: Arc<A>, effects: Arc<E>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            ticker: Arc::new(Mutex::new(None)),
            reports: Arc::new(Mutex::new(Vec::new())),
            permission_requested: Arc::new(AtomicBool::new(false)),
            api,
            effects,
            productivity: None,
            presets: PresetMinutes::default(),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn with_presets(mut self, presets: PresetMinutes) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Refreshes the productivity summary after every recorded block.
    pub fn with_productivity(mut self, productivity: Arc<ProductivityService<A>>) -> Self {
        self.productivity = Some(productivity);
        self
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::of(&*self.session.lock().await)
    }

    pub async fn configure(&self, minutes: u32, mode: TimerMode) -> Result<TimerSnapshot, InfraError> {
        if minutes == 0 || minutes > MAX_BLOCK_MINUTES {
            return Err(InfraError::Precondition(format!(
                "timer minutes must be within 1..={MAX_BLOCK_MINUTES}"
            )));
        }
        let snapshot = {
            let mut session = self.session.lock().await;
            session.configure(minutes, mode).map_err(InfraError::InvalidState)?;
            TimerSnapshot::of(&session)
        };
        self.effects.display(&snapshot);
        Ok(snapshot)
    }

    pub async fn apply_preset(&self, preset: TimerPreset) -> Result<TimerSnapshot, InfraError> {
        let snapshot = {
            let mut session = self.session.lock().await;
            session
                .apply_preset(preset, &self.presets)
                .map_err(InfraError::InvalidState)?;
            TimerSnapshot::of(&session)
        };
        self.effects.display(&snapshot);
        Ok(snapshot)
    }

    // The ticker slot is locked before the session in start, pause and reset,
    // so a state change and its ticker swap are never interleaved.
    pub async fn start(&self) -> TimerSnapshot {
        let mut ticker = self.ticker.lock().await;
        let (outcome, snapshot) = {
            let mut session = self.session.lock().await;
            let outcome = session.start();
            (outcome, TimerSnapshot::of(&session))
        };
        if outcome == StartOutcome::AlreadyRunning {
            return snapshot;
        }

        if !self.permission_requested.swap(true, Ordering::SeqCst) {
            self.effects.request_notification_permission();
        }
        self.replace_ticker(&mut ticker);
        drop(ticker);
        self.effects.display(&snapshot);
        info!("timer started: mode={} remaining={}s", snapshot.mode.as_str(), snapshot.remaining_seconds);
        snapshot
    }

    pub async fn pause(&self) -> Result<TimerSnapshot, InfraError> {
        let mut ticker = self.ticker.lock().await;
        let snapshot = {
            let mut session = self.session.lock().await;
            session.pause().map_err(InfraError::InvalidState)?;
            TimerSnapshot::of(&session)
        };
        Self::stop_ticker(&mut ticker);
        drop(ticker);
        self.effects.display(&snapshot);
        Ok(snapshot)
    }

    pub async fn reset(&self) -> TimerSnapshot {
        let mut ticker = self.ticker.lock().await;
        Self::stop_ticker(&mut ticker);
        let snapshot = {
            let mut session = self.session.lock().await;
            session.reset();
            TimerSnapshot::of(&session)
        };
        drop(ticker);
        self.effects.display(&snapshot);
        snapshot
    }

    /// Space bar behaviour: pause when running, start otherwise.
    pub async fn toggle(&self) -> Result<TimerSnapshot, InfraError> {
        let running = self.session.lock().await.state() == TimerState::Running;
        if running {
            self.pause().await
        } else {
            Ok(self.start().await)
        }
    }

    /// Applies one tick. Returns whether the ticker should keep running.
    pub async fn advance_tick(&self) -> bool {
        let (outcome, snapshot) = {
            let mut session = self.session.lock().await;
            let outcome = session.tick();
            (outcome, TimerSnapshot::of(&session))
        };

        match outcome {
            TickOutcome::Ignored => false,
            TickOutcome::Counting { .. } => {
                self.effects.display(&snapshot);
                true
            }
            TickOutcome::Warning { remaining_seconds } => {
                self.effects.display(&snapshot);
                self.effects.warning(remaining_seconds);
                true
            }
            TickOutcome::Completed { report, next } => {
                self.effects.display(&snapshot);
                self.effects.completed(report.mode, next);
                self.spawn_report(report).await;
                false
            }
        }
    }

    /// Waits for every in-flight completion report.
    pub async fn wait_for_reports(&self) {
        let handles = std::mem::take(&mut *self.reports.lock().await);
        for handle in handles {
            if let Err(join_error) = handle.await {
                error!("timer report task failed: {join_error}");
            }
        }
    }

    async fn spawn_report(&self, report: TimerBlockReport) {
        let api = Arc::clone(&self.api);
        let effects = Arc::clone(&self.effects);
        let productivity = self.productivity.clone();
        let handle = tokio::spawn(async move {
            match api.register_timer_block(&report).await {
                Ok(_) => {
                    info!(
                        "registered timer block: tipo={} duracion={}",
                        report.mode.as_str(),
                        report.duration_minutes
                    );
                    effects.block_reported(&report);
                    if let Some(productivity) = productivity {
                        let summary = productivity.refresh().await;
                        info!(
                            "productivity refreshed: blocks={} time={}",
                            summary.study_blocks,
                            summary.accumulated_time_label()
                        );
                    }
                }
                Err(report_error) => {
                    warn!("failed to register timer block: {report_error}");
                }
            }
        });

        let mut reports = self.reports.lock().await;
        reports.retain(|pending| !pending.is_finished());
        reports.push(handle);
    }

    fn replace_ticker(&self, slot: &mut Option<JoinHandle<()>>) {
        Self::stop_ticker(slot);

        let controller = self.clone();
        let tick_interval = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !controller.advance_tick().await {
                    break;
                }
            }
        });

        *slot = Some(handle);
    }

    fn stop_ticker(slot: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}
