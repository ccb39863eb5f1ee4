use crate::application::notifications::Notifier;
use crate::domain::models::{ProductivitySummary, TimerBlockReport, ToastKind};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_client::{
    DatetimeResponse, EventTimeUpdate, OptimizeResponse, PlannerApi, ProductivitySource,
    ToggleCompletionResponse, UpdateEventResponse,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Scripted<T> = Mutex<VecDeque<Result<T, InfraError>>>;

fn pop_or<T>(queue: &Scripted<T>, fallback: impl FnOnce() -> Result<T, InfraError>) -> Result<T, InfraError> {
    queue
        .lock()
        .expect("scripted response lock poisoned")
        .pop_front()
        .unwrap_or_else(fallback)
}

pub(crate) fn network_error(operation: &str) -> InfraError {
    InfraError::Transport(format!("network error while {operation}"))
}

/// Scripted planner backend. Each queue is consumed front to back; an empty
/// queue falls back to a successful default.
#[derive(Default)]
pub(crate) struct FakePlannerApi {
    pub reports: Mutex<Vec<TimerBlockReport>>,
    pub report_results: Scripted<serde_json::Value>,
    pub primary_productivity: Scripted<ProductivitySummary>,
    pub legacy_productivity: Scripted<ProductivitySummary>,
    pub toggle_results: Scripted<ToggleCompletionResponse>,
    pub optimize_results: Scripted<OptimizeResponse>,
    pub update_results: Scripted<UpdateEventResponse>,
    pub updated_events: Mutex<Vec<String>>,
    pub datetime_results: Scripted<DatetimeResponse>,
    pub productivity_calls: AtomicUsize,
    pub toggle_calls: AtomicUsize,
    pub optimize_calls: AtomicUsize,
    pub datetime_calls: AtomicUsize,
    /// Delay applied to mutating calls, used to cancel them mid-flight.
    pub latency: Mutex<Duration>,
}

impl FakePlannerApi {
    pub fn push<T>(queue: &Scripted<T>, result: Result<T, InfraError>) {
        queue
            .lock()
            .expect("scripted response lock poisoned")
            .push_back(result);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("latency lock poisoned") = latency;
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().expect("latency lock poisoned");
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn reports(&self) -> Vec<TimerBlockReport> {
        self.reports.lock().expect("reports lock poisoned").clone()
    }

    pub fn updated_events(&self) -> Vec<String> {
        self.updated_events
            .lock()
            .expect("updated events lock poisoned")
            .clone()
    }
}

#[async_trait]
impl PlannerApi for FakePlannerApi {
    async fn register_timer_block(
        &self,
        report: &TimerBlockReport,
    ) -> Result<serde_json::Value, InfraError> {
        self.reports
            .lock()
            .expect("reports lock poisoned")
            .push(report.clone());
        pop_or(&self.report_results, || Ok(serde_json::json!({"success": true})))
    }

    async fn productivity(
        &self,
        source: ProductivitySource,
    ) -> Result<ProductivitySummary, InfraError> {
        self.productivity_calls.fetch_add(1, Ordering::SeqCst);
        match source {
            ProductivitySource::Primary => {
                pop_or(&self.primary_productivity, || Ok(ProductivitySummary::default()))
            }
            ProductivitySource::Legacy => {
                pop_or(&self.legacy_productivity, || Ok(ProductivitySummary::default()))
            }
        }
    }

    async fn toggle_completion(
        &self,
        _event_id: &str,
    ) -> Result<ToggleCompletionResponse, InfraError> {
        self.toggle_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        pop_or(&self.toggle_results, || Err(network_error("toggling event completion")))
    }

    async fn optimize(&self) -> Result<OptimizeResponse, InfraError> {
        self.optimize_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        pop_or(&self.optimize_results, || {
            Ok(OptimizeResponse {
                success: true,
                ..OptimizeResponse::default()
            })
        })
    }

    async fn update_event_times(
        &self,
        event_id: &str,
        _update: &EventTimeUpdate,
    ) -> Result<UpdateEventResponse, InfraError> {
        self.updated_events
            .lock()
            .expect("updated events lock poisoned")
            .push(event_id.to_string());
        self.simulate_latency().await;
        pop_or(&self.update_results, || {
            Ok(UpdateEventResponse {
                success: true,
                error: None,
            })
        })
    }

    async fn current_datetime(&self) -> Result<DatetimeResponse, InfraError> {
        self.datetime_calls.fetch_add(1, Ordering::SeqCst);
        pop_or(&self.datetime_results, || Err(network_error("loading current datetime")))
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, ToastKind)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, ToastKind)> {
        self.messages.lock().expect("notifier lock poisoned").clone()
    }

    pub fn last(&self) -> Option<(String, ToastKind)> {
        self.messages().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, kind: ToastKind) -> u64 {
        let mut messages = self.messages.lock().expect("notifier lock poisoned");
        messages.push((message.to_string(), kind));
        messages.len() as u64
    }
}
