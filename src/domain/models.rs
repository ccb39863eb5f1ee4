use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimerMode {
    #[serde(rename = "estudio")]
    Study,
    #[serde(rename = "descanso")]
    Break,
}

impl TimerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "estudio",
            Self::Break => "descanso",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "estudio" | "study" => Some(Self::Study),
            "descanso" | "break" => Some(Self::Break),
            _ => None,
        }
    }

    pub fn completion_message(self) -> &'static str {
        match self {
            Self::Study => "Study block completed!",
            Self::Break => "Break finished!",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
}

impl TimerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }
}

/// Payload recorded by the backend when a focus block finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerBlockReport {
    #[serde(rename = "tipo")]
    pub mode: TimerMode,
    #[serde(rename = "duracion")]
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub day_index: u8,
    pub is_completed: bool,
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        if self.day_index > 6 {
            return Err("event.day_index must be within 0..=6".to_string());
        }
        Ok(())
    }

    pub fn duration_label(&self) -> Option<String> {
        let minutes = (self.end_time - self.start_time).num_minutes();
        if minutes < 0 {
            return None;
        }
        if minutes >= 60 {
            let hours = minutes / 60;
            let rest = minutes % 60;
            if rest > 0 {
                Some(format!("{hours}h {rest}m"))
            } else {
                Some(format!("{hours}h"))
            }
        } else {
            Some(format!("{minutes}m"))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeOption {
    pub hour: u32,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub event_id: String,
    pub current_time: String,
    pub suggested_time: String,
    pub suggested_end_time: String,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub alternative_options: Vec<AlternativeOption>,
}

impl Suggestion {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.event_id, "suggestion.event_id")?;
        validate_non_empty(&self.suggested_time, "suggestion.suggested_time")?;
        validate_non_empty(&self.suggested_end_time, "suggestion.suggested_end_time")?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err("suggestion.confidence must be within 0..=1".to_string());
        }
        Ok(())
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_confidence(self.confidence)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::High
        } else if confidence >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "high confidence",
            Self::Medium => "medium confidence",
            Self::Low => "low confidence",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToastNotification {
    pub id: u64,
    pub message: String,
    pub kind: ToastKind,
    pub created_at: DateTime<Utc>,
    /// `None` while the countdown is paused by hover.
    pub auto_dismiss_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub paused_remaining: Option<chrono::Duration>,
}

impl ToastNotification {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.auto_dismiss_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductivitySummary {
    #[serde(rename = "productividad", default)]
    pub productivity: f64,
    #[serde(rename = "dia", default)]
    pub day: i64,
    #[serde(rename = "bloques_estudio", default)]
    pub study_blocks: u32,
    #[serde(rename = "minutos_totales", default)]
    pub total_minutes: u32,
    #[serde(rename = "productividad_dias", default)]
    pub daily_productivity: Option<Vec<f64>>,
    #[serde(rename = "dia_actual", default)]
    pub current_day: Option<usize>,
}

impl ProductivitySummary {
    pub fn today_percentage(&self) -> f64 {
        match (&self.daily_productivity, self.current_day) {
            (Some(days), Some(index)) => days.get(index).copied().unwrap_or(0.0),
            _ => self.productivity,
        }
    }

    pub fn accumulated_time_label(&self) -> String {
        if self.total_minutes >= 60 {
            format!("{}h {}m", self.total_minutes / 60, self.total_minutes % 60)
        } else {
            format!("{}m", self.total_minutes)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatetimeGreeting {
    pub greeting: String,
    pub current_date: String,
}

fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OpaqueId {
        Text(String),
        Number(i64),
    }

    Ok(match OpaqueId::deserialize(deserializer)? {
        OpaqueId::Text(value) => value,
        OpaqueId::Number(value) => value.to_string(),
    })
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> CalendarEvent {
        CalendarEvent {
            id: "42".to_string(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).expect("valid time"),
            day_index: 2,
            is_completed: false,
        }
    }

    #[test]
    fn confidence_tiers_have_readable_labels() {
        let labels = [0.85, 0.65, 0.2]
            .map(|confidence| ConfidenceTier::from_confidence(confidence).label());
        assert_eq!(labels, ["high confidence", "medium confidence", "low confidence"]);
    }

    #[test]
    fn event_validate_rejects_day_out_of_range() {
        let mut event = sample_event();
        assert!(event.validate().is_ok());
        event.day_index = 7;
        assert!(event.validate().is_err());
    }

    #[test]
    fn event_duration_label_formats_hours_and_minutes() {
        let mut event = sample_event();
        assert_eq!(event.duration_label().as_deref(), Some("1h 30m"));
        event.end_time = NaiveTime::from_hms_opt(11, 0, 0).expect("valid time");
        assert_eq!(event.duration_label().as_deref(), Some("2h"));
        event.end_time = NaiveTime::from_hms_opt(9, 45, 0).expect("valid time");
        assert_eq!(event.duration_label().as_deref(), Some("45m"));
    }

    #[test]
    fn confidence_tier_thresholds() {
        assert_eq!(ConfidenceTier::from_confidence(0.95), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(0.8), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(0.79), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.6), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.59), ConfidenceTier::Low);
    }

    #[test]
    fn suggestion_accepts_numeric_event_id() {
        let payload = serde_json::json!({
            "event_id": 17,
            "current_time": "2026-02-16T09:00:00",
            "suggested_time": "2026-02-16T11:00:00",
            "suggested_end_time": "2026-02-16T12:00:00",
            "confidence": 0.72,
            "alternative_options": [{"hour": 14, "score": 0.5}]
        });
        let suggestion: Suggestion = serde_json::from_value(payload).expect("parse suggestion");
        assert_eq!(suggestion.event_id, "17");
        assert_eq!(suggestion.tier(), ConfidenceTier::Medium);
        assert!(suggestion.reason.is_empty());
        assert_eq!(suggestion.alternative_options[0].hour, 14);
        assert!(suggestion.validate().is_ok());
    }

    #[test]
    fn suggestion_validate_rejects_confidence_out_of_range() {
        let suggestion = Suggestion {
            event_id: "1".to_string(),
            current_time: "09:00".to_string(),
            suggested_time: "10:00".to_string(),
            suggested_end_time: "11:00".to_string(),
            confidence: 1.4,
            reason: String::new(),
            alternative_options: Vec::new(),
        };
        assert!(suggestion.validate().is_err());
    }

    #[test]
    fn timer_block_report_uses_backend_field_names() {
        let report = TimerBlockReport {
            mode: TimerMode::Study,
            duration_minutes: 1,
        };
        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value, serde_json::json!({"tipo": "estudio", "duracion": 1}));
    }

    #[test]
    fn productivity_summary_defaults_missing_fields() {
        let summary: ProductivitySummary =
            serde_json::from_str(r#"{"minutos_totales": 125, "productividad_dias": [10, 20, 30, 0, 0, 0, 0], "dia_actual": 2}"#)
                .expect("parse summary");
        assert_eq!(summary.study_blocks, 0);
        assert_eq!(summary.accumulated_time_label(), "2h 5m");
        assert_eq!(summary.today_percentage(), 30.0);

        let empty = ProductivitySummary::default();
        assert_eq!(empty.accumulated_time_label(), "0m");
        assert_eq!(empty.today_percentage(), 0.0);
    }
}
