use crate::domain::calendar::{ContextMenuAction, GridMetrics, WeekDirection};
use crate::domain::timer::TimerPreset;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    Document,
    Input,
    TextArea,
    Select,
}

impl FocusTarget {
    pub fn is_editable(self) -> bool {
        !matches!(self, Self::Document)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub focus: FocusTarget,
}

impl KeyInput {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            meta: false,
            shift: false,
            focus: FocusTarget::Document,
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn focused_on(mut self, focus: FocusTarget) -> Self {
        self.focus = focus;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickTarget {
    /// An empty grid cell. `column_position` counts the time gutter as 0.
    Cell {
        column_position: usize,
        pointer_y: f64,
        metrics: GridMetrics,
    },
    Event {
        event_id: String,
    },
    Elsewhere,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    Click { target: ClickTarget, at: Instant },
    ContextMenu { event_id: String, x: f64, y: f64, at: Instant },
    MenuOption { action: ContextMenuAction },
}

/// High-level actions. Detection (keys, pointer) produces these; a single
/// dispatch routes them to the timer or the calendar.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    ToggleTimer,
    ResetTimer,
    ApplyPreset(TimerPreset),
    CreateEvent,
    OpenSchedules,
    NavigateWeek(WeekDirection),
    QuickCreate { column_position: usize, hour: u8 },
    OpenContextMenu { event_id: String, x: f64, y: f64, at: Instant },
    SelectMenuOption(ContextMenuAction),
    CloseContextMenu { at: Instant },
    ToggleCompletion { event_id: String },
}

pub fn shortcut_intent(input: &KeyInput) -> Option<Intent> {
    if input.focus.is_editable() {
        return None;
    }

    if input.ctrl || input.meta {
        return match input.key.as_str() {
            "n" | "N" => Some(Intent::CreateEvent),
            "h" | "H" => Some(Intent::OpenSchedules),
            _ => None,
        };
    }

    match input.key.as_str() {
        " " => Some(Intent::ToggleTimer),
        "r" => Some(Intent::ResetTimer),
        "1" => Some(Intent::ApplyPreset(TimerPreset::Pomodoro)),
        "2" => Some(Intent::ApplyPreset(TimerPreset::ShortBlock)),
        "3" => Some(Intent::ApplyPreset(TimerPreset::LongBlock)),
        "ArrowLeft" if input.shift => Some(Intent::NavigateWeek(WeekDirection::Prev)),
        "ArrowRight" if input.shift => Some(Intent::NavigateWeek(WeekDirection::Next)),
        "Home" => Some(Intent::NavigateWeek(WeekDirection::Current)),
        _ => None,
    }
}
