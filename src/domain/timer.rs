use crate::domain::models::{TimerBlockReport, TimerMode, TimerState};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WARNING_SECONDS: u32 = 5;
/// Largest block whose length in seconds still fits the countdown.
pub const MAX_BLOCK_MINUTES: u32 = u32::MAX / 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerPreset {
    Pomodoro,
    ShortBlock,
    LongBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresetMinutes {
    pub pomodoro: u32,
    pub short_block: u32,
    pub long_block: u32,
}

impl Default for PresetMinutes {
    fn default() -> Self {
        Self {
            pomodoro: 25,
            short_block: 15,
            long_block: 50,
        }
    }
}

impl PresetMinutes {
    pub fn minutes_for(&self, preset: TimerPreset) -> u32 {
        match preset {
            TimerPreset::Pomodoro => self.pomodoro,
            TimerPreset::ShortBlock => self.short_block,
            TimerPreset::LongBlock => self.long_block,
        }
    }
}

/// Durations used to propose the block that follows a completed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePolicy {
    pub study_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_every: u32,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            study_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_every: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct NextBlock {
    pub mode: TimerMode,
    pub minutes: u32,
    pub long_break: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Ignored,
    Counting { remaining_seconds: u32 },
    Warning { remaining_seconds: u32 },
    Completed {
        report: TimerBlockReport,
        next: NextBlock,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSession {
    remaining_seconds: u32,
    total_seconds: u32,
    mode: TimerMode,
    state: TimerState,
    warning_seconds: u32,
    completed_blocks: u32,
    cycle: u32,
    cycle_policy: CyclePolicy,
}

impl Default for TimerSession {
    fn default() -> Self {
        Self::new(25, TimerMode::Study)
    }
}

impl TimerSession {
    pub fn new(minutes: u32, mode: TimerMode) -> Self {
        let total_seconds = minutes.clamp(1, MAX_BLOCK_MINUTES) * 60;
        Self {
            remaining_seconds: total_seconds,
            total_seconds,
            mode,
            state: TimerState::Idle,
            warning_seconds: DEFAULT_WARNING_SECONDS,
            completed_blocks: 0,
            cycle: 1,
            cycle_policy: CyclePolicy::default(),
        }
    }

    pub fn with_warning_seconds(mut self, warning_seconds: u32) -> Self {
        self.warning_seconds = warning_seconds;
        self
    }

    pub fn with_cycle_policy(mut self, cycle_policy: CyclePolicy) -> Self {
        self.cycle_policy = cycle_policy;
        self
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn completed_blocks(&self) -> u32 {
        self.completed_blocks
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn configure(&mut self, minutes: u32, mode: TimerMode) -> Result<(), String> {
        if minutes == 0 {
            return Err("timer minutes must be > 0".to_string());
        }
        let total_seconds = minutes
            .checked_mul(60)
            .ok_or_else(|| format!("timer minutes must be <= {MAX_BLOCK_MINUTES}"))?;
        if self.state != TimerState::Idle {
            return Err(format!(
                "timer must be idle to configure (currently {})",
                self.state.as_str()
            ));
        }
        self.total_seconds = total_seconds;
        self.remaining_seconds = self.total_seconds;
        self.mode = mode;
        Ok(())
    }

    pub fn apply_preset(&mut self, preset: TimerPreset, presets: &PresetMinutes) -> Result<(), String> {
        self.configure(presets.minutes_for(preset), TimerMode::Study)
    }

    pub fn start(&mut self) -> StartOutcome {
        if self.state == TimerState::Running {
            return StartOutcome::AlreadyRunning;
        }
        if self.remaining_seconds == 0 {
            self.remaining_seconds = self.total_seconds;
        }
        self.state = TimerState::Running;
        StartOutcome::Started
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.state = TimerState::Idle;
            self.completed_blocks += 1;
            let report = TimerBlockReport {
                mode: self.mode,
                duration_minutes: self.total_seconds / 60,
            };
            let next = self.next_block();
            return TickOutcome::Completed { report, next };
        }

        if self.remaining_seconds == self.warning_seconds {
            return TickOutcome::Warning {
                remaining_seconds: self.remaining_seconds,
            };
        }
        TickOutcome::Counting {
            remaining_seconds: self.remaining_seconds,
        }
    }

    pub fn pause(&mut self) -> Result<(), String> {
        if self.state != TimerState::Running {
            return Err("timer is not running".to_string());
        }
        self.state = TimerState::Paused;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.remaining_seconds = self.total_seconds;
        self.state = TimerState::Idle;
    }

    pub fn display(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.remaining_seconds / 60,
            self.remaining_seconds % 60
        )
    }

    pub fn progress(&self) -> f64 {
        1.0 - f64::from(self.remaining_seconds) / f64::from(self.total_seconds)
    }

    fn next_block(&mut self) -> NextBlock {
        let policy = self.cycle_policy.clone();
        match self.mode {
            TimerMode::Study => {
                let long_break = policy.long_break_every > 0
                    && self.completed_blocks % policy.long_break_every == 0;
                NextBlock {
                    mode: TimerMode::Break,
                    minutes: if long_break {
                        policy.long_break_minutes
                    } else {
                        policy.short_break_minutes
                    },
                    long_break,
                }
            }
            TimerMode::Break => {
                self.cycle += 1;
                NextBlock {
                    mode: TimerMode::Study,
                    minutes: policy.study_minutes,
                    long_break: false,
                }
            }
        }
    }
}
