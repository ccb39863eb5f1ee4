use chrono::{Datelike, Duration as DateDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use url::Url;

pub const DEFAULT_SLOT_HEIGHT_PX: f64 = 50.0;
pub const DEFAULT_DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(300);
pub const DEFAULT_MENU_CLOSE_GUARD: Duration = Duration::from_millis(100);
pub const CREATE_EVENT_PATH: &str = "/planner/event/create/";
pub const SCHEDULES_PATH: &str = "/planner/horarios/";
const LAST_HOUR: f64 = 23.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeekDirection {
    Prev,
    Next,
    Current,
}

impl WeekDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prev => "prev",
            Self::Next => "next",
            Self::Current => "current",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "prev" => Some(Self::Prev),
            "next" => Some(Self::Next),
            "current" => Some(Self::Current),
            _ => None,
        }
    }
}

/// `None` lets the backend default to the week containing today.
pub fn shift_anchor(
    anchor: Option<NaiveDate>,
    today: NaiveDate,
    direction: WeekDirection,
) -> Option<NaiveDate> {
    let base = anchor.unwrap_or(today);
    match direction {
        WeekDirection::Prev => Some(base - DateDuration::days(7)),
        WeekDirection::Next => Some(base + DateDuration::days(7)),
        WeekDirection::Current => None,
    }
}

pub fn anchor_from_url(url: &Url) -> Option<NaiveDate> {
    url.query_pairs()
        .find(|(key, _)| key == "date")
        .and_then(|(_, value)| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok())
}

pub fn week_navigation_url(current: &Url, direction: WeekDirection, today: NaiveDate) -> Url {
    let anchor = shift_anchor(anchor_from_url(current), today, direction);
    let retained = current
        .query_pairs()
        .filter(|(key, _)| key != "direction" && key != "date")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();

    let mut next = current.clone();
    next.set_query(None);
    {
        let mut pairs = next.query_pairs_mut();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("direction", direction.as_str());
        if let Some(anchor) = anchor {
            pairs.append_pair("date", &anchor.format("%Y-%m-%d").to_string());
        }
    }
    next
}

/// Weeks start on Monday.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - DateDuration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn scroll_offset_for_hour(hour: u32, slot_height: f64) -> f64 {
    (f64::from(hour) - 2.0).max(0.0) * slot_height
}

/// Measurements of a day column taken at click time. Anything the grid could
/// not measure yet is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridMetrics {
    pub column_top: f64,
    pub first_slot_top: Option<f64>,
    pub header_height: Option<f64>,
    pub slot_height: Option<f64>,
}

impl GridMetrics {
    pub fn hour_at(&self, pointer_y: f64, fallback_slot_height: f64) -> u8 {
        let slot_height = self
            .slot_height
            .filter(|height| height.is_finite() && *height > 0.0)
            .unwrap_or(fallback_slot_height);
        let offset = self
            .first_slot_top
            .map(|top| top - self.column_top)
            .or(self.header_height)
            .filter(|offset| offset.is_finite())
            .unwrap_or(fallback_slot_height);

        let y = pointer_y - self.column_top - offset;
        let bucket = (y / slot_height).floor();
        if !bucket.is_finite() {
            return 0;
        }
        bucket.clamp(0.0, LAST_HOUR) as u8
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct QuickCreateRequest {
    pub date: NaiveDate,
    pub hour: u8,
}

impl QuickCreateRequest {
    /// `column_position` counts the time gutter as position 0.
    pub fn from_column(column_position: usize, hour: u8, anchor: NaiveDate) -> Option<Self> {
        let day_index = column_position.checked_sub(1)?;
        if day_index > 6 {
            return None;
        }
        Some(Self {
            date: week_start(anchor) + DateDuration::days(day_index as i64),
            hour: hour.min(LAST_HOUR as u8),
        })
    }

    pub fn url(&self, base: &Url) -> Result<Url, String> {
        let mut url = base
            .join(CREATE_EVENT_PATH)
            .map_err(|error| format!("invalid event create url: {error}"))?;
        url.query_pairs_mut()
            .append_pair("date", &self.date.format("%Y-%m-%d").to_string())
            .append_pair("time", &format!("{:02}:00", self.hour));
        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct ClickDetector {
    window: Duration,
    last_click: Option<Instant>,
}

impl Default for ClickDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DOUBLE_CLICK_WINDOW)
    }
}

impl ClickDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_click: None,
        }
    }

    /// Returns `true` when this click completes a double click.
    pub fn register(&mut self, at: Instant) -> bool {
        if let Some(previous) = self.last_click.take() {
            if at.saturating_duration_since(previous) <= self.window {
                return true;
            }
        }
        self.last_click = Some(at);
        false
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextMenuAction {
    ViewDetails,
    Edit,
    ToggleComplete,
    Delete,
}

impl ContextMenuAction {
    pub const ALL: [ContextMenuAction; 4] = [
        ContextMenuAction::ViewDetails,
        ContextMenuAction::Edit,
        ContextMenuAction::ToggleComplete,
        ContextMenuAction::Delete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ViewDetails => "View details",
            Self::Edit => "Edit",
            Self::ToggleComplete => "Mark completed",
            Self::Delete => "Delete",
        }
    }

    pub fn is_destructive(self) -> bool {
        matches!(self, Self::Delete)
    }

    pub fn route(self, event_id: &str) -> Option<String> {
        match self {
            Self::ViewDetails => Some(format!("/planner/event/{event_id}/")),
            Self::Edit => Some(format!("/planner/event/{event_id}/edit/")),
            Self::Delete => Some(format!("/planner/event/{event_id}/delete/")),
            Self::ToggleComplete => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextMenu {
    pub event_id: String,
    pub x: f64,
    pub y: f64,
    opened_at: Instant,
    close_guard: Duration,
}

impl ContextMenu {
    pub fn open(event_id: impl Into<String>, x: f64, y: f64, at: Instant, close_guard: Duration) -> Self {
        Self {
            event_id: event_id.into(),
            x,
            y,
            opened_at: at,
            close_guard,
        }
    }

    pub fn options(&self) -> &'static [ContextMenuAction] {
        &ContextMenuAction::ALL
    }

    /// Clicks landing inside the guard window belong to the gesture that
    /// opened the menu.
    pub fn closes_on_outside_click(&self, at: Instant) -> bool {
        at.saturating_duration_since(self.opened_at) >= self.close_guard
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TooltipLayout {
    pub margin: f64,
    pub below_offset: f64,
}

impl Default for TooltipLayout {
    fn default() -> Self {
        Self {
            margin: 10.0,
            below_offset: 20.0,
        }
    }
}

impl TooltipLayout {
    pub fn place(
        &self,
        cursor: (f64, f64),
        tooltip_size: (f64, f64),
        viewport_width: f64,
    ) -> (f64, f64) {
        let (cursor_x, cursor_y) = cursor;
        let (width, height) = tooltip_size;

        let mut x = cursor_x;
        if x + width > viewport_width - self.margin {
            x = viewport_width - width - self.margin;
        }
        if x < self.margin {
            x = self.margin;
        }

        let mut y = cursor_y - height - self.margin;
        if y < self.margin {
            y = cursor_y + self.below_offset;
        }
        (x, y)
    }
}
