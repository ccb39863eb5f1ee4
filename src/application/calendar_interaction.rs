use crate::application::notifications::{Notifier, NowProvider};
use crate::domain::calendar::{
    anchor_from_url, week_navigation_url, ClickDetector, ContextMenu, ContextMenuAction,
    QuickCreateRequest, TooltipLayout, CREATE_EVENT_PATH, SCHEDULES_PATH,
};
use crate::domain::input::{ClickTarget, Intent, PointerInput};
use crate::domain::models::{CalendarEvent, ToastKind};
use crate::infrastructure::config::CalendarConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_client::PlannerApi;
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

const TOGGLE_FAILED_MESSAGE: &str = "Could not update the event";
const TOGGLE_CONNECTION_MESSAGE: &str = "Connection error while updating the event";

/// Read-only projection of the rendered week. One event id may be rendered
/// in several day columns.
#[derive(Debug, Clone, Default)]
pub struct EventBoard {
    events: Vec<CalendarEvent>,
}

impl EventBoard {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn completion(&self, event_id: &str) -> Option<bool> {
        self.events
            .iter()
            .find(|event| event.id == event_id)
            .map(|event| event.is_completed)
    }

    pub fn renderings(&self, event_id: &str) -> usize {
        self.events.iter().filter(|event| event.id == event_id).count()
    }

    /// Updates every rendering of the id and returns how many were touched.
    pub fn set_completed(&mut self, event_id: &str, completed: bool) -> usize {
        let mut touched = 0;
        for event in self.events.iter_mut().filter(|event| event.id == event_id) {
            event.is_completed = completed;
            touched += 1;
        }
        touched
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionOutcome {
    Navigate { url: String },
    MenuOpened { event_id: String },
    MenuClosed,
    CompletionToggled { event_id: String, is_completed: bool },
    Ignored,
}

struct ViewState {
    page_url: Url,
    menu: Option<ContextMenu>,
    clicks: ClickDetector,
    pending_toggles: HashSet<String>,
}

/// An optimistic completion flip waiting for the server. Dropping it without
/// `settle` (failure or a cancelled call) restores the prior value; either way
/// the id is released for the next toggle.
struct PendingToggle<'a> {
    board: &'a Mutex<EventBoard>,
    view: &'a Mutex<ViewState>,
    event_id: &'a str,
    prior: bool,
    settled: bool,
}

impl PendingToggle<'_> {
    fn settle(mut self, is_completed: bool) {
        if let Ok(mut board) = self.board.lock() {
            board.set_completed(self.event_id, is_completed);
        }
        self.settled = true;
    }
}

impl Drop for PendingToggle<'_> {
    fn drop(&mut self) {
        if !self.settled {
            if let Ok(mut board) = self.board.lock() {
                board.set_completed(self.event_id, self.prior);
            }
        }
        if let Ok(mut view) = self.view.lock() {
            view.pending_toggles.remove(self.event_id);
        }
    }
}

pub struct CalendarInteraction<A, N>
where
    A: PlannerApi,
    N: Notifier,
{
    api: Arc<A>,
    notifier: Arc<N>,
    board: Mutex<EventBoard>,
    view: Mutex<ViewState>,
    config: CalendarConfig,
    timezone: chrono_tz::Tz,
    now_provider: NowProvider,
}

impl<A, N> CalendarInteraction<A, N>
where
    A: PlannerApi,
    N: Notifier,
{
    pub fn new(api: Arc<A>, notifier: Arc<N>, page_url: Url, config: CalendarConfig) -> Self {
        let clicks = ClickDetector::new(Duration::from_millis(config.double_click_window_ms));
        Self {
            api,
            notifier,
            board: Mutex::new(EventBoard::default()),
            view: Mutex::new(ViewState {
                page_url,
                menu: None,
                clicks,
                pending_toggles: HashSet::new(),
            }),
            config,
            timezone: chrono_tz::UTC,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_timezone(mut self, timezone: chrono_tz::Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn lock_board(&self) -> Result<MutexGuard<'_, EventBoard>, InfraError> {
        self.board
            .lock()
            .map_err(|_| InfraError::InvalidState("event board lock poisoned".to_string()))
    }

    fn lock_view(&self) -> Result<MutexGuard<'_, ViewState>, InfraError> {
        self.view
            .lock()
            .map_err(|_| InfraError::InvalidState("calendar view lock poisoned".to_string()))
    }

    fn today(&self) -> NaiveDate {
        (self.now_provider)().with_timezone(&self.timezone).date_naive()
    }

    pub fn load_events(&self, events: Vec<CalendarEvent>) -> Result<usize, InfraError> {
        let valid = events
            .into_iter()
            .filter(|event| match event.validate() {
                Ok(()) => true,
                Err(message) => {
                    warn!("skipping calendar event {}: {message}", event.id);
                    false
                }
            })
            .collect::<Vec<_>>();
        let count = valid.len();
        *self.lock_board()? = EventBoard::new(valid);
        Ok(count)
    }

    pub fn board(&self) -> Result<EventBoard, InfraError> {
        Ok(self.lock_board()?.clone())
    }

    pub fn page_url(&self) -> Result<Url, InfraError> {
        Ok(self.lock_view()?.page_url.clone())
    }

    pub fn open_menu(&self) -> Result<Option<ContextMenu>, InfraError> {
        Ok(self.lock_view()?.menu.clone())
    }

    pub fn tooltip_layout(&self) -> TooltipLayout {
        TooltipLayout {
            margin: self.config.tooltip_margin_px,
            below_offset: self.config.tooltip_below_offset_px,
        }
    }

    /// Maps raw pointer input to an intent. Clicks on event elements never
    /// reach the double-click detector.
    pub fn handle_pointer(&self, input: PointerInput) -> Result<Option<Intent>, InfraError> {
        let mut view = self.lock_view()?;
        let intent = match input {
            PointerInput::ContextMenu { event_id, x, y, at } => {
                Some(Intent::OpenContextMenu { event_id, x, y, at })
            }
            PointerInput::MenuOption { action } => view
                .menu
                .as_ref()
                .map(|_| Intent::SelectMenuOption(action)),
            PointerInput::Click { at, .. } if view.menu.is_some() => {
                Some(Intent::CloseContextMenu { at })
            }
            PointerInput::Click { target, at } => match target {
                ClickTarget::Cell {
                    column_position,
                    pointer_y,
                    metrics,
                } => view.clicks.register(at).then(|| Intent::QuickCreate {
                    column_position,
                    hour: metrics.hour_at(pointer_y, self.config.fallback_slot_height_px),
                }),
                ClickTarget::Event { .. } | ClickTarget::Elsewhere => None,
            },
        };
        Ok(intent)
    }

    pub async fn dispatch(&self, intent: Intent) -> Result<InteractionOutcome, InfraError> {
        match intent {
            Intent::CreateEvent => self.navigate_to(CREATE_EVENT_PATH),
            Intent::OpenSchedules => self.navigate_to(SCHEDULES_PATH),
            Intent::NavigateWeek(direction) => {
                let today = self.today();
                let mut view = self.lock_view()?;
                let next = week_navigation_url(&view.page_url, direction, today);
                view.page_url = next.clone();
                view.menu = None;
                Ok(InteractionOutcome::Navigate { url: next.into() })
            }
            Intent::QuickCreate {
                column_position,
                hour,
            } => {
                let today = self.today();
                let page_url = self.page_url()?;
                let anchor = anchor_from_url(&page_url).unwrap_or(today);
                let Some(request) = QuickCreateRequest::from_column(column_position, hour, anchor)
                else {
                    return Ok(InteractionOutcome::Ignored);
                };
                let url = request.url(&page_url).map_err(InfraError::InvalidConfig)?;
                Ok(InteractionOutcome::Navigate { url: url.into() })
            }
            Intent::OpenContextMenu { event_id, x, y, at } => {
                let guard = Duration::from_millis(self.config.menu_close_guard_ms);
                self.lock_view()?.menu = Some(ContextMenu::open(event_id.clone(), x, y, at, guard));
                Ok(InteractionOutcome::MenuOpened { event_id })
            }
            Intent::CloseContextMenu { at } => {
                let mut view = self.lock_view()?;
                let closes = view
                    .menu
                    .as_ref()
                    .is_some_and(|menu| menu.closes_on_outside_click(at));
                if closes {
                    view.menu = None;
                    Ok(InteractionOutcome::MenuClosed)
                } else {
                    Ok(InteractionOutcome::Ignored)
                }
            }
            Intent::SelectMenuOption(action) => {
                let Some(menu) = self.lock_view()?.menu.take() else {
                    return Ok(InteractionOutcome::Ignored);
                };
                self.select_menu_option(&menu.event_id, action).await
            }
            Intent::ToggleCompletion { event_id } => self.toggle_completion(&event_id).await,
            Intent::ToggleTimer | Intent::ResetTimer | Intent::ApplyPreset(_) => {
                Ok(InteractionOutcome::Ignored)
            }
        }
    }

    async fn select_menu_option(
        &self,
        event_id: &str,
        action: ContextMenuAction,
    ) -> Result<InteractionOutcome, InfraError> {
        match action.route(event_id) {
            Some(route) => self.navigate_to(&route),
            None => self.toggle_completion(event_id).await,
        }
    }

    fn navigate_to(&self, path: &str) -> Result<InteractionOutcome, InfraError> {
        let url = self
            .page_url()?
            .join(path)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid route {path}: {error}")))?;
        Ok(InteractionOutcome::Navigate { url: url.into() })
    }

    /// Flips every rendering optimistically, then reconciles with the server.
    /// Any failure restores the prior value.
    pub async fn toggle_completion(&self, event_id: &str) -> Result<InteractionOutcome, InfraError> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(InfraError::Precondition("event id must not be empty".to_string()));
        }

        let pending = {
            let mut board = self.lock_board()?;
            let prior = board.completion(event_id).ok_or_else(|| {
                InfraError::Precondition(format!("event not rendered: {event_id}"))
            })?;
            if !self.lock_view()?.pending_toggles.insert(event_id.to_string()) {
                return Err(InfraError::InvalidState(format!(
                    "completion toggle already in flight for {event_id}"
                )));
            }
            board.set_completed(event_id, !prior);
            PendingToggle {
                board: &self.board,
                view: &self.view,
                event_id,
                prior,
                settled: false,
            }
        };

        match self.api.toggle_completion(event_id).await {
            Ok(response) if response.success => {
                pending.settle(response.is_completed);
                let message = if response.message.trim().is_empty() {
                    if response.is_completed {
                        "Event marked as completed"
                    } else {
                        "Event marked as pending"
                    }
                } else {
                    response.message.as_str()
                };
                self.notifier.notify(message, ToastKind::Success);
                info!("toggled completion event_id={event_id} is_completed={}", response.is_completed);
                Ok(InteractionOutcome::CompletionToggled {
                    event_id: event_id.to_string(),
                    is_completed: response.is_completed,
                })
            }
            Ok(response) => {
                drop(pending);
                let message = response
                    .error
                    .filter(|error| !error.trim().is_empty())
                    .unwrap_or_else(|| TOGGLE_FAILED_MESSAGE.to_string());
                self.notifier.notify(&message, ToastKind::Error);
                Err(InfraError::Server(message))
            }
            Err(error) => {
                drop(pending);
                warn!("completion toggle failed for {event_id}: {error}");
                self.notifier.notify(TOGGLE_CONNECTION_MESSAGE, ToastKind::Error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fake_planner::{network_error, FakePlannerApi, RecordingNotifier};
    use crate::domain::calendar::{GridMetrics, WeekDirection};
    use crate::infrastructure::planner_client::ToggleCompletionResponse;
    use chrono::{DateTime, NaiveTime};
    use std::time::Instant;

    type Interaction = CalendarInteraction<FakePlannerApi, RecordingNotifier>;

    fn calendar_config() -> CalendarConfig {
        CalendarConfig {
            fallback_slot_height_px: 50.0,
            double_click_window_ms: 300,
            menu_close_guard_ms: 100,
            tooltip_margin_px: 10.0,
            tooltip_below_offset_px: 20.0,
        }
    }

    fn event(id: &str, day_index: u8, completed: bool) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).expect("valid time"),
            day_index,
            is_completed: completed,
        }
    }

    fn interaction(api: Arc<FakePlannerApi>, notifier: Arc<RecordingNotifier>) -> Interaction {
        let page = Url::parse("http://planner.local/planner/calendar/?view=week").expect("page url");
        let now = DateTime::parse_from_rfc3339("2026-02-18T12:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let interaction = CalendarInteraction::new(api, notifier, page, calendar_config())
            .with_now_provider(Arc::new(move || now));
        interaction
            .load_events(vec![event("7", 1, false), event("7", 2, false), event("8", 3, true)])
            .expect("load events");
        interaction
    }

    fn toggle_ok(is_completed: bool) -> ToggleCompletionResponse {
        ToggleCompletionResponse {
            success: true,
            is_completed,
            message: String::new(),
            error: None,
        }
    }

    fn cell(at: Instant) -> PointerInput {
        PointerInput::Click {
            target: ClickTarget::Cell {
                column_position: 3,
                pointer_y: 600.0,
                metrics: GridMetrics {
                    column_top: 100.0,
                    first_slot_top: Some(150.0),
                    header_height: None,
                    slot_height: Some(50.0),
                },
            },
            at,
        }
    }

    #[tokio::test]
    async fn toggle_updates_every_rendering_and_double_toggle_restores() {
        let api = Arc::new(FakePlannerApi::default());
        FakePlannerApi::push(&api.toggle_results, Ok(toggle_ok(true)));
        FakePlannerApi::push(&api.toggle_results, Ok(toggle_ok(false)));
        let notifier = Arc::new(RecordingNotifier::default());
        let interaction = interaction(Arc::clone(&api), Arc::clone(&notifier));

        let outcome = interaction.toggle_completion("7").await.expect("first toggle");
        assert_eq!(
            outcome,
            InteractionOutcome::CompletionToggled {
                event_id: "7".to_string(),
                is_completed: true,
            }
        );
        let board = interaction.board().expect("board");
        assert_eq!(board.renderings("7"), 2);
        assert!(board.events().iter().filter(|event| event.id == "7").all(|event| event.is_completed));

        interaction.toggle_completion("7").await.expect("second toggle");
        let board = interaction.board().expect("board");
        assert!(board.events().iter().filter(|event| event.id == "7").all(|event| !event.is_completed));
        assert_eq!(notifier.last().map(|(_, kind)| kind), Some(ToastKind::Success));
    }

    #[tokio::test]
    async fn toggle_rolls_back_on_transport_failure() {
        let api = Arc::new(FakePlannerApi::default());
        FakePlannerApi::push(&api.toggle_results, Err(network_error("toggling event completion")));
        let notifier = Arc::new(RecordingNotifier::default());
        let interaction = interaction(Arc::clone(&api), Arc::clone(&notifier));

        let result = interaction.toggle_completion("8").await;
        assert!(matches!(result, Err(InfraError::Transport(_))));
        assert_eq!(interaction.board().expect("board").completion("8"), Some(true));
        assert_eq!(notifier.last().map(|(_, kind)| kind), Some(ToastKind::Error));

        FakePlannerApi::push(&api.toggle_results, Ok(toggle_ok(false)));
        interaction.toggle_completion("8").await.expect("retry after failure");
        assert_eq!(interaction.board().expect("board").completion("8"), Some(false));
    }

    #[tokio::test]
    async fn toggle_rolls_back_when_server_rejects() {
        let api = Arc::new(FakePlannerApi::default());
        FakePlannerApi::push(
            &api.toggle_results,
            Ok(ToggleCompletionResponse {
                success: false,
                is_completed: false,
                message: String::new(),
                error: Some("Event locked".to_string()),
            }),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let interaction = interaction(Arc::clone(&api), Arc::clone(&notifier));

        match interaction.toggle_completion("7").await {
            Err(InfraError::Server(message)) => assert_eq!(message, "Event locked"),
            other => panic!("expected server error, got {other:?}"),
        }
        assert_eq!(interaction.board().expect("board").completion("7"), Some(false));
        assert_eq!(
            notifier.last(),
            Some(("Event locked".to_string(), ToastKind::Error))
        );
    }

    #[tokio::test]
    async fn cancelled_toggle_rolls_back_and_releases_the_event() {
        let api = Arc::new(FakePlannerApi::default());
        api.set_latency(Duration::from_secs(30));
        let notifier = Arc::new(RecordingNotifier::default());
        let interaction = interaction(Arc::clone(&api), Arc::clone(&notifier));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), interaction.toggle_completion("7")).await;
        assert!(cancelled.is_err());
        let board = interaction.board().expect("board");
        assert!(board.events().iter().filter(|event| event.id == "7").all(|event| !event.is_completed));

        api.set_latency(Duration::ZERO);
        FakePlannerApi::push(&api.toggle_results, Ok(toggle_ok(true)));
        interaction.toggle_completion("7").await.expect("toggle after cancel");
        assert_eq!(interaction.board().expect("board").completion("7"), Some(true));
    }

    #[test]
    fn tooltip_layout_follows_configured_margins() {
        let api = Arc::new(FakePlannerApi::default());
        let page = Url::parse("http://planner.local/planner/calendar/").expect("page url");
        let config = CalendarConfig {
            tooltip_margin_px: 4.0,
            tooltip_below_offset_px: 12.0,
            ..calendar_config()
        };
        let interaction = CalendarInteraction::new(api, Arc::new(RecordingNotifier::default()), page, config);

        let layout = interaction.tooltip_layout();
        assert_eq!(layout.place((995.0, 300.0), (100.0, 40.0), 1000.0), (896.0, 256.0));
        assert_eq!(layout.place((500.0, 30.0), (100.0, 40.0), 1000.0), (500.0, 42.0));
    }

    #[tokio::test]
    async fn unknown_event_is_rejected_before_request() {
        let api = Arc::new(FakePlannerApi::default());
        let interaction = interaction(Arc::clone(&api), Arc::new(RecordingNotifier::default()));
        assert!(matches!(
            interaction.toggle_completion("missing").await,
            Err(InfraError::Precondition(_))
        ));
        assert_eq!(api.toggle_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn double_click_on_cell_quick_creates_in_anchor_week() {
        let interaction = interaction(
            Arc::new(FakePlannerApi::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let start = Instant::now();
        assert_eq!(interaction.handle_pointer(cell(start)).expect("first click"), None);
        let intent = interaction
            .handle_pointer(cell(start + Duration::from_millis(200)))
            .expect("second click")
            .expect("double click intent");
        assert_eq!(
            intent,
            Intent::QuickCreate {
                column_position: 3,
                hour: 9,
            }
        );

        let outcome = interaction.dispatch(intent).await.expect("dispatch quick create");
        assert_eq!(
            outcome,
            InteractionOutcome::Navigate {
                url: "http://planner.local/planner/event/create/?date=2026-02-18&time=09%3A00".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn slow_clicks_and_event_clicks_do_not_quick_create() {
        let interaction = interaction(
            Arc::new(FakePlannerApi::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let start = Instant::now();
        assert_eq!(interaction.handle_pointer(cell(start)).expect("click"), None);
        assert_eq!(
            interaction
                .handle_pointer(cell(start + Duration::from_millis(301)))
                .expect("slow click"),
            None
        );

        let event_click = PointerInput::Click {
            target: ClickTarget::Event {
                event_id: "7".to_string(),
            },
            at: start + Duration::from_millis(350),
        };
        assert_eq!(interaction.handle_pointer(event_click).expect("event click"), None);
    }

    #[tokio::test]
    async fn week_navigation_shifts_anchor_and_keeps_query() {
        let interaction = interaction(
            Arc::new(FakePlannerApi::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let next = interaction
            .dispatch(Intent::NavigateWeek(WeekDirection::Next))
            .await
            .expect("next week");
        assert_eq!(
            next,
            InteractionOutcome::Navigate {
                url: "http://planner.local/planner/calendar/?view=week&direction=next&date=2026-02-25".to_string(),
            }
        );

        interaction
            .dispatch(Intent::NavigateWeek(WeekDirection::Prev))
            .await
            .expect("previous week");
        let page = interaction.page_url().expect("page url");
        assert_eq!(anchor_from_url(&page), NaiveDate::from_ymd_opt(2026, 2, 18));

        interaction
            .dispatch(Intent::NavigateWeek(WeekDirection::Current))
            .await
            .expect("current week");
        assert_eq!(anchor_from_url(&interaction.page_url().expect("page url")), None);
    }

    #[tokio::test]
    async fn context_menu_respects_close_guard_and_routes_options() {
        let interaction = interaction(
            Arc::new(FakePlannerApi::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let opened_at = Instant::now();
        let intent = interaction
            .handle_pointer(PointerInput::ContextMenu {
                event_id: "7".to_string(),
                x: 40.0,
                y: 80.0,
                at: opened_at,
            })
            .expect("context menu")
            .expect("open intent");
        assert_eq!(
            interaction.dispatch(intent).await.expect("open menu"),
            InteractionOutcome::MenuOpened {
                event_id: "7".to_string()
            }
        );

        let early = interaction
            .handle_pointer(PointerInput::Click {
                target: ClickTarget::Elsewhere,
                at: opened_at + Duration::from_millis(50),
            })
            .expect("early click")
            .expect("close intent");
        assert_eq!(interaction.dispatch(early).await.expect("guarded"), InteractionOutcome::Ignored);
        assert!(interaction.open_menu().expect("menu").is_some());

        let edit = interaction
            .handle_pointer(PointerInput::MenuOption {
                action: ContextMenuAction::Edit,
            })
            .expect("menu option")
            .expect("select intent");
        assert_eq!(
            interaction.dispatch(edit).await.expect("edit"),
            InteractionOutcome::Navigate {
                url: "http://planner.local/planner/event/7/edit/".to_string(),
            }
        );
        assert!(interaction.open_menu().expect("menu").is_none());
        assert_eq!(
            interaction
                .handle_pointer(PointerInput::MenuOption {
                    action: ContextMenuAction::Delete,
                })
                .expect("closed menu option"),
            None
        );
    }

    #[tokio::test]
    async fn outside_click_after_guard_closes_menu() {
        let interaction = interaction(
            Arc::new(FakePlannerApi::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let opened_at = Instant::now();
        interaction
            .dispatch(Intent::OpenContextMenu {
                event_id: "8".to_string(),
                x: 0.0,
                y: 0.0,
                at: opened_at,
            })
            .await
            .expect("open menu");
        let outcome = interaction
            .dispatch(Intent::CloseContextMenu {
                at: opened_at + Duration::from_millis(150),
            })
            .await
            .expect("close menu");
        assert_eq!(outcome, InteractionOutcome::MenuClosed);
    }
}
