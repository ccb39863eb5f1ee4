use crate::application::notifications::Notifier;
use crate::domain::models::{ConfidenceTier, Suggestion, ToastKind};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_client::{EventTimeUpdate, PlannerApi};
use log::{info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

pub const MIN_TASKS_FOR_OPTIMIZATION: u32 = 4;
const NO_IMPROVEMENT_MESSAGE: &str = "No possible optimizations were found.";
const OPTIMIZE_FAILED_MESSAGE: &str =
    "There was an error optimizing the schedule. Please try again later.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReviewItem {
    pub suggestion: Suggestion,
    pub tier: ConfidenceTier,
    pub selected: bool,
}

impl ReviewItem {
    fn new(suggestion: Suggestion) -> Self {
        Self {
            tier: suggestion.tier(),
            suggestion,
            selected: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ReviewState {
    Idle,
    Requesting,
    NoSuggestions(String),
    Reviewing(Vec<ReviewItem>),
    Applying(Vec<ReviewItem>),
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::NoSuggestions(_) => "no_suggestions",
            Self::Reviewing(_) => "reviewing",
            Self::Applying(_) => "applying",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub reload_required: bool,
}

pub fn insufficient_tasks_message(current_tasks: u32) -> String {
    let needed = MIN_TASKS_FOR_OPTIMIZATION.saturating_sub(current_tasks);
    format!(
        "At least {MIN_TASKS_FOR_OPTIMIZATION} tasks are needed to generate suggestions. \
         You currently have {current_tasks}. Add {needed} more to optimize your schedule."
    )
}

fn lock_review(state: &Mutex<ReviewState>) -> MutexGuard<'_, ReviewState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the workflow in a busy state. Unless settled, dropping it restores
/// `fallback`, so a cancelled request or apply never leaves the workflow stuck.
struct BusyState<'a> {
    state: &'a Mutex<ReviewState>,
    fallback: Option<ReviewState>,
}

impl<'a> BusyState<'a> {
    fn enter(
        state: &'a Mutex<ReviewState>,
        current: &mut ReviewState,
        busy: ReviewState,
        fallback: ReviewState,
    ) -> Self {
        *current = busy;
        Self {
            state,
            fallback: Some(fallback),
        }
    }

    fn settle(mut self, next: ReviewState) {
        self.fallback = None;
        *lock_review(self.state) = next;
    }
}

impl Drop for BusyState<'_> {
    fn drop(&mut self) {
        if let Some(fallback) = self.fallback.take() {
            *lock_review(self.state) = fallback;
        }
    }
}

pub struct SuggestionReviewWorkflow<A, N>
where
    A: PlannerApi,
    N: Notifier,
{
    api: Arc<A>,
    notifier: Arc<N>,
    state: Mutex<ReviewState>,
}

impl<A, N> SuggestionReviewWorkflow<A, N>
where
    A: PlannerApi,
    N: Notifier,
{
    pub fn new(api: Arc<A>, notifier: Arc<N>) -> Self {
        Self {
            api,
            notifier,
            state: Mutex::new(ReviewState::Idle),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ReviewState> {
        lock_review(&self.state)
    }

    #[cfg(test)]
    fn set_state(&self, next: ReviewState) {
        *self.lock_state() = next;
    }

    pub fn state(&self) -> ReviewState {
        self.lock_state().clone()
    }

    pub async fn request_suggestions(&self) -> Result<ReviewState, InfraError> {
        let busy = {
            let mut state = self.lock_state();
            if matches!(*state, ReviewState::Requesting | ReviewState::Applying(_)) {
                return Err(InfraError::InvalidState(format!(
                    "optimization already in progress ({})",
                    state.as_str()
                )));
            }
            BusyState::enter(&self.state, &mut state, ReviewState::Requesting, ReviewState::Idle)
        };

        let response = match self.api.optimize().await {
            Ok(response) => response,
            Err(error) => {
                drop(busy);
                warn!("optimization request failed: {error}");
                self.notifier.notify(OPTIMIZE_FAILED_MESSAGE, ToastKind::Error);
                return Err(error);
            }
        };

        if !response.success {
            drop(busy);
            let message = response
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            warn!("optimization rejected by server: {message}");
            self.notifier.notify(OPTIMIZE_FAILED_MESSAGE, ToastKind::Error);
            return Err(InfraError::Server(message));
        }

        let items = response
            .suggestions
            .unwrap_or_default()
            .into_iter()
            .filter(|suggestion| match suggestion.validate() {
                Ok(()) => true,
                Err(message) => {
                    warn!("dropping suggestion for event {}: {message}", suggestion.event_id);
                    false
                }
            })
            .map(ReviewItem::new)
            .collect::<Vec<_>>();

        let next = if items.is_empty() {
            let reason = if response.insufficient_tasks {
                insufficient_tasks_message(response.current_tasks.unwrap_or(0))
            } else {
                response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| NO_IMPROVEMENT_MESSAGE.to_string())
            };
            self.notifier.notify(&reason, ToastKind::Info);
            ReviewState::NoSuggestions(reason)
        } else {
            info!("received {} optimization suggestions", items.len());
            ReviewState::Reviewing(items)
        };

        busy.settle(next.clone());
        Ok(next)
    }

    /// Returns the number of selected suggestions after the change.
    pub fn set_selected(&self, event_id: &str, selected: bool) -> Result<usize, InfraError> {
        let mut state = self.lock_state();
        let items = match &mut *state {
            ReviewState::Reviewing(items) => items,
            other => {
                return Err(InfraError::InvalidState(format!(
                    "suggestions can only be selected while reviewing ({})",
                    other.as_str()
                )));
            }
        };
        let item = items
            .iter_mut()
            .find(|item| item.suggestion.event_id == event_id)
            .ok_or_else(|| InfraError::Precondition(format!("no suggestion for event {event_id}")))?;
        item.selected = selected;
        Ok(items.iter().filter(|item| item.selected).count())
    }

    /// Applies the selected suggestions one at a time. The first failure
    /// stops the batch; updates already applied stay applied.
    pub async fn apply_selected(&self) -> Result<ApplyOutcome, InfraError> {
        let (items, busy) = {
            let mut state = self.lock_state();
            let items = match &*state {
                ReviewState::Reviewing(items) => items.clone(),
                other => {
                    return Err(InfraError::InvalidState(format!(
                        "apply is only valid while reviewing ({})",
                        other.as_str()
                    )));
                }
            };
            if !items.iter().any(|item| item.selected) {
                return Err(InfraError::Precondition(
                    "select at least one suggestion to apply".to_string(),
                ));
            }
            let busy = BusyState::enter(
                &self.state,
                &mut state,
                ReviewState::Applying(items.clone()),
                ReviewState::Reviewing(items.clone()),
            );
            (items, busy)
        };

        let mut applied = 0;
        for item in items.iter().filter(|item| item.selected) {
            let suggestion = &item.suggestion;
            let update = EventTimeUpdate {
                start_time: suggestion.suggested_time.clone(),
                end_time: suggestion.suggested_end_time.clone(),
            };
            let failure = match self.api.update_event_times(&suggestion.event_id, &update).await {
                Ok(response) if response.success => None,
                Ok(response) => Some(
                    response
                        .error
                        .filter(|error| !error.trim().is_empty())
                        .unwrap_or_else(|| "unknown error".to_string()),
                ),
                Err(error) => Some(error.to_string()),
            };

            if let Some(message) = failure {
                warn!(
                    "applying suggestion for event {} failed after {applied} applied: {message}",
                    suggestion.event_id
                );
                drop(busy);
                self.notifier.notify(
                    &format!("Error applying changes: {message}"),
                    ToastKind::Error,
                );
                return Err(InfraError::ApplyAborted {
                    event_id: suggestion.event_id.clone(),
                    applied,
                    message,
                });
            }
            applied += 1;
        }

        busy.settle(ReviewState::Idle);
        info!("applied {applied} optimization suggestions");
        self.notifier.notify(
            &format!("{applied} changes applied successfully"),
            ToastKind::Success,
        );
        Ok(ApplyOutcome {
            applied,
            reload_required: true,
        })
    }

    /// Close, cancel and backdrop clicks. Ignored while a batch is applying.
    pub fn dismiss(&self) -> bool {
        let mut state = self.lock_state();
        match *state {
            ReviewState::Reviewing(_) | ReviewState::NoSuggestions(_) => {
                *state = ReviewState::Idle;
                true
            }
            _ => false,
        }
    }
}
