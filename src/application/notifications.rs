use crate::domain::models::{ToastKind, ToastNotification};
use crate::infrastructure::config::{NotificationConfig, MAX_TOAST_DISMISS_MS};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub trait Notifier: Send + Sync {
    /// Shows a message and returns the toast id.
    fn notify(&self, message: &str, kind: ToastKind) -> u64;
}

pub struct ToastCenter {
    toasts: Mutex<Vec<ToastNotification>>,
    next_id: AtomicU64,
    default_dismiss: Duration,
    error_dismiss: Duration,
    now_provider: NowProvider,
}

impl Default for ToastCenter {
    fn default() -> Self {
        Self::new(&NotificationConfig {
            default_dismiss_ms: 5_000,
            error_dismiss_ms: 8_000,
        })
    }
}

impl ToastCenter {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            toasts: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            default_dismiss: dismiss_delay(config.default_dismiss_ms),
            error_dismiss: dismiss_delay(config.error_dismiss_ms),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn lock_toasts(&self) -> MutexGuard<'_, Vec<ToastNotification>> {
        self.toasts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lifetime(&self, kind: ToastKind) -> Duration {
        match kind {
            ToastKind::Error => self.error_dismiss,
            _ => self.default_dismiss,
        }
    }

    pub fn push(&self, message: &str, kind: ToastKind) -> u64 {
        let now = (self.now_provider)();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_toasts().push(ToastNotification {
            id,
            message: message.to_string(),
            kind,
            created_at: now,
            auto_dismiss_at: Some(now + self.lifetime(kind)),
            paused_remaining: None,
        });
        id
    }

    /// Pauses the countdown. Returns `false` for unknown or already paused toasts.
    pub fn hover(&self, id: u64) -> bool {
        let now = (self.now_provider)();
        let mut toasts = self.lock_toasts();
        let Some(toast) = toasts.iter_mut().find(|toast| toast.id == id) else {
            return false;
        };
        let Some(deadline) = toast.auto_dismiss_at.take() else {
            return false;
        };
        toast.paused_remaining = Some((deadline - now).max(Duration::zero()));
        true
    }

    pub fn unhover(&self, id: u64) -> bool {
        let now = (self.now_provider)();
        let mut toasts = self.lock_toasts();
        let Some(toast) = toasts.iter_mut().find(|toast| toast.id == id) else {
            return false;
        };
        let Some(remaining) = toast.paused_remaining.take() else {
            return false;
        };
        toast.auto_dismiss_at = Some(now + remaining);
        true
    }

    pub fn dismiss(&self, id: u64) -> bool {
        let mut toasts = self.lock_toasts();
        let before = toasts.len();
        toasts.retain(|toast| toast.id != id);
        toasts.len() != before
    }

    /// Removes and returns every toast whose countdown has run out.
    pub fn expire(&self, now: DateTime<Utc>) -> Vec<ToastNotification> {
        let mut toasts = self.lock_toasts();
        let (due, kept): (Vec<_>, Vec<_>) = toasts.drain(..).partition(|toast| toast.is_due(now));
        *toasts = kept;
        due
    }

    pub fn active(&self) -> Vec<ToastNotification> {
        self.lock_toasts().clone()
    }
}

fn dismiss_delay(millis: u64) -> Duration {
    Duration::milliseconds(millis.min(MAX_TOAST_DISMISS_MS) as i64)
}

impl Notifier for ToastCenter {
    fn notify(&self, message: &str, kind: ToastKind) -> u64 {
        self.push(message, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_clock() -> (Arc<Mutex<DateTime<Utc>>>, NowProvider) {
        let clock = Arc::new(Mutex::new(
            DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
        ));
        let reader = Arc::clone(&clock);
        let provider: NowProvider = Arc::new(move || *reader.lock().expect("clock lock poisoned"));
        (clock, provider)
    }

    fn advance(clock: &Mutex<DateTime<Utc>>, millis: i64) -> DateTime<Utc> {
        let mut now = clock.lock().expect("clock lock poisoned");
        *now += Duration::milliseconds(millis);
        *now
    }

    #[test]
    fn errors_outlive_other_toasts() {
        let (clock, provider) = fixed_clock();
        let center = ToastCenter::default().with_now_provider(provider);
        let info = center.push("Saved", ToastKind::Success);
        let error = center.push("Failed", ToastKind::Error);

        let expired = center.expire(advance(&clock, 5_000));
        assert_eq!(expired.iter().map(|toast| toast.id).collect::<Vec<_>>(), vec![info]);

        let expired = center.expire(advance(&clock, 3_000));
        assert_eq!(expired.iter().map(|toast| toast.id).collect::<Vec<_>>(), vec![error]);
        assert!(center.active().is_empty());
    }

    #[test]
    fn hover_pauses_and_leave_resumes_countdown() {
        let (clock, provider) = fixed_clock();
        let center = ToastCenter::default().with_now_provider(provider);
        let id = center.push("Block recorded", ToastKind::Info);

        advance(&clock, 4_000);
        assert!(center.hover(id));
        assert!(!center.hover(id));

        let later = advance(&clock, 60_000);
        assert!(center.expire(later).is_empty());

        assert!(center.unhover(id));
        assert!(center.expire(advance(&clock, 999)).is_empty());
        assert_eq!(center.expire(advance(&clock, 1)).len(), 1);
    }

    #[test]
    fn manual_dismiss_removes_toast() {
        let center = ToastCenter::default();
        let id = center.notify("Hello", ToastKind::Warning);
        assert_eq!(center.active().len(), 1);
        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
        assert!(center.active().is_empty());
    }
}
