pub mod bootstrap;
pub mod calendar_interaction;
pub mod commands;
pub mod dashboard;
#[cfg(test)]
pub(crate) mod fake_planner;
pub mod focus_timer;
pub mod notifications;
pub mod suggestion_review;
