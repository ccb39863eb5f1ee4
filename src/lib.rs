pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    active_toasts_impl, apply_preset_impl, apply_suggestions_impl, configure_timer_impl,
    latest_productivity_impl, load_events_impl, navigate_week_impl, refresh_datetime_impl,
    refresh_productivity_impl, request_suggestions_impl, set_suggestion_selected_impl,
    start_dashboard_refresh_impl, start_timer_impl, timer_state_impl, toggle_completion_impl,
    AppState,
};
use application::suggestion_review::ReviewState;
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use domain::models::{CalendarEvent, TimerState};
use domain::timer::TimerPreset;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub use application::commands::IntentOutcome;
pub use infrastructure::error::InfraError;

#[derive(Debug, Parser)]
#[command(name = "planner-companion")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Workspace holding config/ and logs/ (default: current directory)
    #[arg(long, short = 'w')]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one focus block and report it when it finishes
    Timer {
        #[arg(long)]
        minutes: Option<u32>,
        /// estudio | descanso
        #[arg(long, default_value = "estudio")]
        mode: String,
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,
    },
    /// Request optimizer suggestions, optionally applying them
    Optimize {
        #[arg(long)]
        apply: bool,
        /// Event ids to leave out of the batch
        #[arg(long = "skip")]
        skip: Vec<String>,
    },
    /// Toggle completion for an event
    Toggle {
        event_id: String,
        /// The event is currently rendered as completed
        #[arg(long)]
        completed: bool,
    },
    /// Print the calendar URL for prev | next | current
    Week { direction: String },
    Productivity,
    Datetime,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PresetArg {
    Pomodoro,
    ShortBlock,
    LongBlock,
}

impl From<PresetArg> for TimerPreset {
    fn from(value: PresetArg) -> Self {
        match value {
            PresetArg::Pomodoro => TimerPreset::Pomodoro,
            PresetArg::ShortBlock => TimerPreset::ShortBlock,
            PresetArg::LongBlock => TimerPreset::LongBlock,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value).map_err(|error| error.to_string())?;
    println!("{rendered}");
    Ok(())
}

async fn run_timer(
    state: &AppState,
    minutes: Option<u32>,
    mode: String,
    preset: Option<PresetArg>,
) -> Result<(), String> {
    if let Some(preset) = preset {
        apply_preset_impl(state, preset.into())
            .await
            .map_err(|error| state.command_error("apply_preset", &error))?;
    } else if let Some(minutes) = minutes {
        configure_timer_impl(state, minutes, mode)
            .await
            .map_err(|error| state.command_error("configure_timer", &error))?;
    }

    let _dashboard = start_dashboard_refresh_impl(state);
    let started = start_timer_impl(state).await;
    println!("{} {}", started.mode.as_str(), started.display);

    let mut last_display = started.display;
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let snapshot = timer_state_impl(state).await;
        if snapshot.display != last_display {
            println!("{}", snapshot.display);
            last_display = snapshot.display.clone();
        }
        if snapshot.state != TimerState::Running {
            break;
        }
    }

    state.timer().wait_for_reports().await;
    for toast in active_toasts_impl(state) {
        println!("[{:?}] {}", toast.kind, toast.message);
    }
    if let Some(summary) = latest_productivity_impl(state) {
        println!(
            "today: {} blocks, {}",
            summary.study_blocks,
            summary.accumulated_time_label()
        );
    }
    Ok(())
}

async fn run_optimize(state: &AppState, apply: bool, skip: Vec<String>) -> Result<(), String> {
    let review = request_suggestions_impl(state)
        .await
        .map_err(|error| state.command_error("request_suggestions", &error))?;
    print_json(&review)?;

    if !apply || !matches!(review, ReviewState::Reviewing(_)) {
        return Ok(());
    }
    for event_id in skip {
        set_suggestion_selected_impl(state, event_id, false)
            .map_err(|error| state.command_error("set_suggestion_selected", &error))?;
    }
    let outcome = apply_suggestions_impl(state)
        .await
        .map_err(|error| state.command_error("apply_suggestions", &error))?;
    print_json(&outcome)
}

async fn run_toggle(state: &AppState, event_id: String, completed: bool) -> Result<(), String> {
    let rendered = CalendarEvent {
        id: event_id.trim().to_string(),
        start_time: NaiveTime::default(),
        end_time: NaiveTime::default(),
        day_index: 0,
        is_completed: completed,
    };
    load_events_impl(state, vec![rendered])
        .map_err(|error| state.command_error("load_events", &error))?;
    let outcome = toggle_completion_impl(state, event_id)
        .await
        .map_err(|error| state.command_error("toggle_completion", &error))?;
    print_json(&outcome)
}

pub async fn run(cli: Cli) -> Result<(), String> {
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;

    match cli.command {
        Command::Timer {
            minutes,
            mode,
            preset,
        } => run_timer(&state, minutes, mode, preset).await,
        Command::Optimize { apply, skip } => run_optimize(&state, apply, skip).await,
        Command::Toggle {
            event_id,
            completed,
        } => run_toggle(&state, event_id, completed).await,
        Command::Week { direction } => {
            let url = navigate_week_impl(&state, direction)
                .await
                .map_err(|error| state.command_error("navigate_week", &error))?;
            println!("{url}");
            Ok(())
        }
        Command::Productivity => print_json(&refresh_productivity_impl(&state).await),
        Command::Datetime => {
            let greeting = refresh_datetime_impl(&state)
                .await
                .map_err(|error| state.command_error("refresh_datetime", &error))?;
            print_json(&greeting)
        }
    }
}
