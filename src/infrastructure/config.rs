use crate::domain::timer::{CyclePolicy, PresetMinutes, MAX_BLOCK_MINUTES};
use crate::infrastructure::error::InfraError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const CALENDAR_JSON: &str = "calendar.json";
const NOTIFICATIONS_JSON: &str = "notifications.json";
const SUPPORTED_SCHEMA: u64 = 1;
pub const MAX_TOAST_DISMISS_MS: u64 = 24 * 60 * 60 * 1_000;

const BASE_URL_KEYS: &[&str] = &["PLANNER_BASE_URL"];
const CSRF_TOKEN_KEYS: &[&str] = &["PLANNER_CSRF_TOKEN"];
const COOKIE_KEYS: &[&str] = &["PLANNER_COOKIE"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub base_url: String,
    pub timezone: String,
    pub csrf_cookie_name: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
    /// Raw `Cookie` header of the browser session, e.g. `sessionid=..; csrftoken=..`.
    #[serde(default)]
    pub session_cookie: Option<String>,
    pub request_timeout_seconds: u64,
    pub datetime_retry_seconds: u64,
    pub datetime_retry_attempts: u8,
    #[serde(default = "default_productivity_refresh_seconds")]
    pub productivity_refresh_seconds: u64,
    #[serde(default = "default_datetime_refresh_seconds")]
    pub datetime_refresh_seconds: u64,
}

fn default_productivity_refresh_seconds() -> u64 {
    30
}

fn default_datetime_refresh_seconds() -> u64 {
    60
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        url::Url::parse(&self.base_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid baseUrl: {error}")))?;
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone: {error}")))?;
        if self.csrf_cookie_name.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "csrfCookieName must not be empty".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "requestTimeoutSeconds must be > 0".to_string(),
            ));
        }
        if self.productivity_refresh_seconds == 0 || self.datetime_refresh_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "dashboard refresh intervals must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn datetime_retry_delay_ms(&self) -> u64 {
        self.datetime_retry_seconds.saturating_mul(1_000)
    }

    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub default_minutes: u32,
    pub warning_seconds: u32,
    pub long_break_every: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub presets: PresetMinutes,
}

impl TimerConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        let presets = &self.presets;
        let durations = [
            self.default_minutes,
            self.short_break_minutes,
            self.long_break_minutes,
            presets.pomodoro,
            presets.short_block,
            presets.long_block,
        ];
        if durations
            .iter()
            .any(|minutes| !(1..=MAX_BLOCK_MINUTES).contains(minutes))
        {
            return Err(InfraError::InvalidConfig(format!(
                "timer durations must be within 1..={MAX_BLOCK_MINUTES} minutes"
            )));
        }
        Ok(())
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        CyclePolicy {
            study_minutes: self.presets.pomodoro,
            short_break_minutes: self.short_break_minutes,
            long_break_minutes: self.long_break_minutes,
            long_break_every: self.long_break_every,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConfig {
    pub fallback_slot_height_px: f64,
    pub double_click_window_ms: u64,
    pub menu_close_guard_ms: u64,
    pub tooltip_margin_px: f64,
    pub tooltip_below_offset_px: f64,
}

impl CalendarConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if !(self.fallback_slot_height_px.is_finite() && self.fallback_slot_height_px > 0.0) {
            return Err(InfraError::InvalidConfig(
                "fallbackSlotHeightPx must be a positive number".to_string(),
            ));
        }
        for (name, value) in [
            ("tooltipMarginPx", self.tooltip_margin_px),
            ("tooltipBelowOffsetPx", self.tooltip_below_offset_px),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(InfraError::InvalidConfig(format!("{name} must be >= 0")));
            }
        }
        if self.double_click_window_ms == 0 {
            return Err(InfraError::InvalidConfig(
                "doubleClickWindowMs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub default_dismiss_ms: u64,
    pub error_dismiss_ms: u64,
}

impl NotificationConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        let delays = [self.default_dismiss_ms, self.error_dismiss_ms];
        if delays
            .iter()
            .any(|delay| !(1..=MAX_TOAST_DISMISS_MS).contains(delay))
        {
            return Err(InfraError::InvalidConfig(format!(
                "toast dismiss delays must be within 1..={MAX_TOAST_DISMISS_MS} ms"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub app: AppConfig,
    pub timer: TimerConfig,
    pub calendar: CalendarConfig,
    pub notifications: NotificationConfig,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "baseUrl": "http://127.0.0.1:8000/",
                "timezone": "UTC",
                "csrfCookieName": "csrftoken",
                "requestTimeoutSeconds": 15,
                "datetimeRetrySeconds": 30,
                "datetimeRetryAttempts": 3,
                "productivityRefreshSeconds": 30,
                "datetimeRefreshSeconds": 60
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultMinutes": 25,
                "warningSeconds": 5,
                "longBreakEvery": 4,
                "shortBreakMinutes": 5,
                "longBreakMinutes": 15,
                "presets": {
                    "pomodoro": 25,
                    "shortBlock": 15,
                    "longBlock": 50
                }
            }),
        ),
        (
            CALENDAR_JSON,
            serde_json::json!({
                "schema": 1,
                "fallbackSlotHeightPx": 50.0,
                "doubleClickWindowMs": 300,
                "menuCloseGuardMs": 100,
                "tooltipMarginPx": 10.0,
                "tooltipBelowOffsetPx": 20.0
            }),
        ),
        (
            NOTIFICATIONS_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultDismissMs": 5000,
                "errorDismissMs": 8000
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_typed<T: DeserializeOwned>(path: &Path) -> Result<T, InfraError> {
    let value = read_config(path)?;
    serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    let bundle = ConfigBundle {
        app: read_typed(&config_dir.join(APP_JSON))?,
        timer: read_typed(&config_dir.join(TIMER_JSON))?,
        calendar: read_typed(&config_dir.join(CALENDAR_JSON))?,
        notifications: read_typed(&config_dir.join(NOTIFICATIONS_JSON))?,
    };
    bundle.app.validate()?;
    bundle.timer.validate()?;
    bundle.calendar.validate()?;
    bundle.notifications.validate()?;
    Ok(bundle)
}

pub fn apply_overrides_from_lookup<F>(app: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base_url) = lookup_value(&lookup, BASE_URL_KEYS) {
        app.base_url = base_url;
    }
    if let Some(token) = lookup_value(&lookup, CSRF_TOKEN_KEYS) {
        app.csrf_token = Some(token);
    }
    if let Some(cookie) = lookup_value(&lookup, COOKIE_KEYS) {
        app.session_cookie = Some(cookie);
    }
}

fn lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

pub fn save_base_url(config_dir: &Path, base_url: &str) -> Result<(), InfraError> {
    let base_url = base_url.trim();
    url::Url::parse(base_url)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid baseUrl: {error}")))?;

    let path = config_dir.join(APP_JSON);
    let mut app = read_config(&path)?;
    let object = app.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert(
        "baseUrl".to_string(),
        serde_json::Value::String(base_url.to_string()),
    );

    let formatted = serde_json::to_string_pretty(&app)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}
