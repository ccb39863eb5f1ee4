use crate::application::bootstrap::bootstrap_workspace;
use crate::application::calendar_interaction::{CalendarInteraction, EventBoard, InteractionOutcome};
use crate::application::dashboard::{
    DashboardRefresh, DatetimeRefresher, ProductivityService, RetryPolicy,
};
use crate::application::focus_timer::{TimerController, TimerEffects, TimerSnapshot};
use crate::application::notifications::{Notifier, ToastCenter};
use crate::application::suggestion_review::{ApplyOutcome, ReviewState, SuggestionReviewWorkflow};
use crate::domain::calendar::WeekDirection;
use crate::domain::input::{shortcut_intent, Intent, KeyInput, PointerInput};
use crate::domain::models::{
    CalendarEvent, DatetimeGreeting, ProductivitySummary, TimerBlockReport, TimerMode, ToastKind,
    ToastNotification,
};
use crate::domain::timer::{NextBlock, TimerPreset, TimerSession};
use crate::infrastructure::config::{apply_overrides_from_lookup, ConfigBundle};
use crate::infrastructure::csrf::{CsrfTokenSource, PageCsrfSource};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_client::ReqwestPlannerClient;
use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CALENDAR_PAGE_PATH: &str = "planner/horarios/";

pub type AppTimer = TimerController<ReqwestPlannerClient, ToastTimerEffects>;

/// Routes timer effects to the toast stack.
pub struct ToastTimerEffects {
    toasts: Arc<ToastCenter>,
}

impl TimerEffects for ToastTimerEffects {
    fn display(&self, snapshot: &TimerSnapshot) {
        debug!("timer {} {}", snapshot.state.as_str(), snapshot.display);
    }

    fn warning(&self, remaining_seconds: u32) {
        self.toasts.notify(
            &format!("{remaining_seconds} seconds left in this block"),
            ToastKind::Warning,
        );
    }

    fn completed(&self, mode: TimerMode, next: NextBlock) {
        let suggestion = match (next.mode, next.long_break) {
            (TimerMode::Break, true) => format!("Take a long break of {} minutes", next.minutes),
            (TimerMode::Break, false) => format!("Take a short break of {} minutes", next.minutes),
            (TimerMode::Study, _) => format!("Start a {}-minute study block", next.minutes),
        };
        self.toasts.notify(
            &format!("{} {suggestion}.", mode.completion_message()),
            ToastKind::Success,
        );
    }

    fn request_notification_permission(&self) {
        info!("notification permission requested");
    }

    fn block_reported(&self, report: &TimerBlockReport) {
        self.toasts.notify(
            &format!("{}-minute {} block recorded", report.duration_minutes, report.mode.as_str()),
            ToastKind::Info,
        );
    }
}

pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    configs: ConfigBundle,
    csrf: Arc<PageCsrfSource>,
    toasts: Arc<ToastCenter>,
    timer: AppTimer,
    calendar: CalendarInteraction<ReqwestPlannerClient, ToastCenter>,
    suggestions: SuggestionReviewWorkflow<ReqwestPlannerClient, ToastCenter>,
    productivity: Arc<ProductivityService<ReqwestPlannerClient>>,
    datetime: Arc<DatetimeRefresher<ReqwestPlannerClient>>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_env_lookup(workspace_root, |key| std::env::var(key).ok())
    }

    pub fn with_env_lookup<F>(workspace_root: PathBuf, lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let mut configs = bootstrap.configs;
        apply_overrides_from_lookup(&mut configs.app, lookup);
        configs.app.validate()?;

        let csrf = Arc::new(PageCsrfSource::new(configs.app.csrf_cookie_name.clone()));
        csrf.set_form_token(configs.app.csrf_token.clone());
        csrf.set_cookie_header(configs.app.session_cookie.clone());
        let token_source: Arc<dyn CsrfTokenSource> = Arc::clone(&csrf) as Arc<dyn CsrfTokenSource>;
        let api = Arc::new(ReqwestPlannerClient::new(
            &configs.app.base_url,
            Duration::from_secs(configs.app.request_timeout_seconds),
            token_source,
        )?);
        let page_url = api.base_url().join(CALENDAR_PAGE_PATH).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid calendar page url: {error}"))
        })?;

        let toasts = Arc::new(ToastCenter::new(&configs.notifications));
        let productivity = Arc::new(ProductivityService::new(Arc::clone(&api)));
        let session = TimerSession::new(configs.timer.default_minutes, TimerMode::Study)
            .with_warning_seconds(configs.timer.warning_seconds)
            .with_cycle_policy(configs.timer.cycle_policy());
        let timer = TimerController::new(
            session,
            Arc::clone(&api),
            Arc::new(ToastTimerEffects {
                toasts: Arc::clone(&toasts),
            }),
        )
        .with_presets(configs.timer.presets.clone())
        .with_productivity(Arc::clone(&productivity));
        let calendar = CalendarInteraction::new(
            Arc::clone(&api),
            Arc::clone(&toasts),
            page_url,
            configs.calendar.clone(),
        )
        .with_timezone(configs.app.tz());
        let suggestions = SuggestionReviewWorkflow::new(Arc::clone(&api), Arc::clone(&toasts));
        let datetime = Arc::new(DatetimeRefresher::new(Arc::clone(&api)).with_retry_policy(
            RetryPolicy {
                max_attempts: configs.app.datetime_retry_attempts,
                delay_ms: configs.app.datetime_retry_delay_ms(),
            },
        ));

        Ok(Self {
            config_dir: bootstrap.config_dir,
            logs_dir: bootstrap.logs_dir,
            configs,
            csrf,
            toasts,
            timer,
            calendar,
            suggestions,
            productivity,
            datetime,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn configs(&self) -> &ConfigBundle {
        &self.configs
    }

    pub fn timer(&self) -> &AppTimer {
        &self.timer
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "target", content = "outcome", rename_all = "snake_case")]
pub enum IntentOutcome {
    Timer(TimerSnapshot),
    Calendar(InteractionOutcome),
    Unhandled,
}

pub async fn timer_state_impl(state: &AppState) -> TimerSnapshot {
    state.timer.snapshot().await
}

pub async fn configure_timer_impl(
    state: &AppState,
    minutes: u32,
    mode: String,
) -> Result<TimerSnapshot, InfraError> {
    let mode = TimerMode::parse(&mode).ok_or_else(|| {
        InfraError::Precondition(format!("mode must be estudio or descanso: {mode}"))
    })?;
    let snapshot = state.timer.configure(minutes, mode).await?;
    state.log_info(
        "configure_timer",
        &format!("configured mode={} minutes={minutes}", mode.as_str()),
    );
    Ok(snapshot)
}

pub async fn apply_preset_impl(
    state: &AppState,
    preset: TimerPreset,
) -> Result<TimerSnapshot, InfraError> {
    let snapshot = state.timer.apply_preset(preset).await?;
    state.log_info("apply_preset", &format!("preset={preset:?} remaining={}", snapshot.display));
    Ok(snapshot)
}

pub async fn start_timer_impl(state: &AppState) -> TimerSnapshot {
    let snapshot = state.timer.start().await;
    state.log_info(
        "start_timer",
        &format!("state={} remaining={}", snapshot.state.as_str(), snapshot.display),
    );
    snapshot
}

pub async fn pause_timer_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let snapshot = state.timer.pause().await?;
    state.log_info("pause_timer", &format!("paused at {}", snapshot.display));
    Ok(snapshot)
}

pub async fn reset_timer_impl(state: &AppState) -> TimerSnapshot {
    let snapshot = state.timer.reset().await;
    state.log_info("reset_timer", &format!("reset to {}", snapshot.display));
    snapshot
}

/// Routes an intent to the timer or the calendar.
pub async fn dispatch_intent_impl(state: &AppState, intent: Intent) -> Result<IntentOutcome, InfraError> {
    let outcome = match intent {
        Intent::ToggleTimer => IntentOutcome::Timer(state.timer.toggle().await?),
        Intent::ResetTimer => IntentOutcome::Timer(reset_timer_impl(state).await),
        Intent::ApplyPreset(preset) => IntentOutcome::Timer(apply_preset_impl(state, preset).await?),
        calendar_intent => IntentOutcome::Calendar(state.calendar.dispatch(calendar_intent).await?),
    };
    Ok(outcome)
}

pub async fn handle_key_impl(state: &AppState, input: KeyInput) -> Result<IntentOutcome, InfraError> {
    match shortcut_intent(&input) {
        Some(intent) => dispatch_intent_impl(state, intent).await,
        None => Ok(IntentOutcome::Unhandled),
    }
}

pub async fn handle_pointer_impl(
    state: &AppState,
    input: PointerInput,
) -> Result<IntentOutcome, InfraError> {
    match state.calendar.handle_pointer(input)? {
        Some(intent) => dispatch_intent_impl(state, intent).await,
        None => Ok(IntentOutcome::Unhandled),
    }
}

pub fn load_events_impl(state: &AppState, events: Vec<CalendarEvent>) -> Result<usize, InfraError> {
    let count = state.calendar.load_events(events)?;
    state.log_info("load_events", &format!("loaded {count} event renderings"));
    Ok(count)
}

pub fn event_board_impl(state: &AppState) -> Result<EventBoard, InfraError> {
    state.calendar.board()
}

pub fn observe_page_impl(state: &AppState, html: &str) {
    state.csrf.observe_page(html);
}

pub async fn navigate_week_impl(state: &AppState, direction: String) -> Result<String, InfraError> {
    let direction = WeekDirection::parse(&direction).ok_or_else(|| {
        InfraError::Precondition(format!("direction must be prev, next or current: {direction}"))
    })?;
    match state.calendar.dispatch(Intent::NavigateWeek(direction)).await? {
        InteractionOutcome::Navigate { url } => {
            state.log_info("navigate_week", &format!("navigating to {url}"));
            Ok(url)
        }
        other => Err(InfraError::InvalidState(format!(
            "unexpected navigation outcome: {other:?}"
        ))),
    }
}

pub async fn toggle_completion_impl(
    state: &AppState,
    event_id: String,
) -> Result<InteractionOutcome, InfraError> {
    let outcome = state.calendar.toggle_completion(&event_id).await?;
    state.log_info("toggle_completion", &format!("toggled event_id={}", event_id.trim()));
    Ok(outcome)
}

pub async fn request_suggestions_impl(state: &AppState) -> Result<ReviewState, InfraError> {
    let review = state.suggestions.request_suggestions().await?;
    state.log_info("request_suggestions", &format!("review state={}", review.as_str()));
    Ok(review)
}

pub fn set_suggestion_selected_impl(
    state: &AppState,
    event_id: String,
    selected: bool,
) -> Result<usize, InfraError> {
    state.suggestions.set_selected(event_id.trim(), selected)
}

pub async fn apply_suggestions_impl(state: &AppState) -> Result<ApplyOutcome, InfraError> {
    let outcome = state.suggestions.apply_selected().await?;
    state.log_info("apply_suggestions", &format!("applied {} suggestions", outcome.applied));
    Ok(outcome)
}

pub fn dismiss_suggestions_impl(state: &AppState) -> bool {
    state.suggestions.dismiss()
}

pub fn review_state_impl(state: &AppState) -> ReviewState {
    state.suggestions.state()
}

pub async fn refresh_productivity_impl(state: &AppState) -> ProductivitySummary {
    let summary = state.productivity.refresh().await;
    state.log_info(
        "refresh_productivity",
        &format!(
            "blocks={} time={} today={}%",
            summary.study_blocks,
            summary.accumulated_time_label(),
            summary.today_percentage()
        ),
    );
    summary
}

pub async fn refresh_datetime_impl(state: &AppState) -> Result<Option<DatetimeGreeting>, InfraError> {
    state.datetime.refresh().await
}

pub fn latest_productivity_impl(state: &AppState) -> Option<ProductivitySummary> {
    state.productivity.latest()
}

pub fn latest_greeting_impl(state: &AppState) -> Option<DatetimeGreeting> {
    state.datetime.latest()
}

/// Starts the background productivity and datetime refreshes. They stop when
/// the returned handle is dropped.
pub fn start_dashboard_refresh_impl(state: &AppState) -> DashboardRefresh {
    let app = &state.configs.app;
    let handles = vec![
        Arc::clone(&state.productivity)
            .spawn_periodic(Duration::from_secs(app.productivity_refresh_seconds)),
        Arc::clone(&state.datetime).spawn_periodic(Duration::from_secs(app.datetime_refresh_seconds)),
    ];
    state.log_info(
        "start_dashboard_refresh",
        &format!(
            "productivity every {}s, datetime every {}s",
            app.productivity_refresh_seconds, app.datetime_refresh_seconds
        ),
    );
    DashboardRefresh::new(handles)
}

pub async fn visibility_changed_impl(
    state: &AppState,
    visible: bool,
) -> Result<Option<DatetimeGreeting>, InfraError> {
    state.datetime.on_visibility_change(visible).await
}

pub fn active_toasts_impl(state: &AppState) -> Vec<ToastNotification> {
    state.toasts.expire(Utc::now());
    state.toasts.active()
}

pub fn hover_toast_impl(state: &AppState, toast_id: u64, hovering: bool) -> bool {
    if hovering {
        state.toasts.hover(toast_id)
    } else {
        state.toasts.unhover(toast_id)
    }
}

pub fn dismiss_toast_impl(state: &AppState, toast_id: u64) -> bool {
    state.toasts.dismiss(toast_id)
}
