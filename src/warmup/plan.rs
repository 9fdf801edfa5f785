//! Warmup plans and per-sender progression.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A named ramp of hourly rate limits, one entry per day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupPlan {
    Conservative,
    #[default]
    Standard,
    Aggressive,
}

const CONSERVATIVE: &[&str] = &[
    "10/hr", "20/hr", "40/hr", "80/hr", "150/hr", "300/hr", "600/hr", "1000/hr", "2000/hr",
    "4000/hr",
];

const STANDARD: &[&str] = &[
    "25/hr", "50/hr", "100/hr", "200/hr", "400/hr", "800/hr", "1600/hr", "3200/hr", "6400/hr",
    "12000/hr",
];

const AGGRESSIVE: &[&str] = &[
    "50/hr", "100/hr", "250/hr", "500/hr", "1000/hr", "2500/hr", "5000/hr", "10000/hr",
    "20000/hr",
];

impl WarmupPlan {
    pub const ALL: [WarmupPlan; 3] = [
        WarmupPlan::Conservative,
        WarmupPlan::Standard,
        WarmupPlan::Aggressive,
    ];

    /// Rate strings indexed by day (day 1 = index 0).
    pub fn rates(self) -> &'static [&'static str] {
        match self {
            WarmupPlan::Conservative => CONSERVATIVE,
            WarmupPlan::Standard => STANDARD,
            WarmupPlan::Aggressive => AGGRESSIVE,
        }
    }

    /// Number of days in the plan.
    pub fn len(self) -> u32 {
        self.rates().len() as u32
    }

    /// Rate for a 1-based day. Day 0 is treated as day 1; past the end is `None`.
    pub fn rate_for_day(self, day: u32) -> Option<&'static str> {
        let index = day.saturating_sub(1) as usize;
        self.rates().get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WarmupPlan::Conservative => "conservative",
            WarmupPlan::Standard => "standard",
            WarmupPlan::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for WarmupPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarmupPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WarmupPlan::ALL
            .into_iter()
            .find(|plan| plan.as_str() == s)
            .ok_or_else(|| format!("unknown warmup plan: {s:?}"))
    }
}

/// Warmup progress of one sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WarmupState {
    pub enabled: bool,
    pub plan: WarmupPlan,
    pub day: u32,
    pub last_update: Option<DateTime<Utc>>,
}

impl WarmupState {
    /// Start a plan at day 1.
    pub fn start(plan: WarmupPlan, now: DateTime<Utc>) -> Self {
        Self {
            enabled: true,
            plan,
            day: 1,
            last_update: Some(now),
        }
    }

    /// Current `max_message_rate`, `None` meaning unlimited.
    pub fn current_rate(&self) -> Option<&'static str> {
        if !self.enabled {
            return None;
        }
        self.plan.rate_for_day(self.day)
    }
}

/// Outcome of evaluating one sender on a scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmupStep {
    /// Warmup is disabled for this sender.
    Idle,
    /// First observation: the clock starts, the day does not move.
    Initialized(WarmupState),
    /// Not enough time has passed since the last change.
    Waiting,
    /// Moved to the next day of the plan.
    Advanced {
        state: WarmupState,
        rate: &'static str,
    },
    /// Plan exhausted; warmup is now disabled (unlimited).
    Completed(WarmupState),
}

impl WarmupStep {
    /// The new state to persist, if any.
    pub fn new_state(&self) -> Option<&WarmupState> {
        match self {
            WarmupStep::Initialized(state)
            | WarmupStep::Advanced { state, .. }
            | WarmupStep::Completed(state) => Some(state),
            WarmupStep::Idle | WarmupStep::Waiting => None,
        }
    }

    /// Whether the effective rate limit changes.
    pub fn changes_rate(&self) -> bool {
        matches!(
            self,
            WarmupStep::Advanced { .. } | WarmupStep::Completed(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            WarmupStep::Idle => "idle",
            WarmupStep::Initialized(_) => "initialized",
            WarmupStep::Waiting => "waiting",
            WarmupStep::Advanced { .. } => "advanced",
            WarmupStep::Completed(_) => "completed",
        }
    }
}

/// Decide what happens to a sender at `now`.
pub fn advance(state: &WarmupState, now: DateTime<Utc>, advance_after: Duration) -> WarmupStep {
    if !state.enabled {
        return WarmupStep::Idle;
    }

    let Some(last_update) = state.last_update else {
        return WarmupStep::Initialized(WarmupState {
            last_update: Some(now),
            ..state.clone()
        });
    };

    if now - last_update < advance_after {
        return WarmupStep::Waiting;
    }

    if state.day >= state.plan.len() {
        return WarmupStep::Completed(WarmupState {
            enabled: false,
            ..state.clone()
        });
    }

    let day = state.day.max(1) + 1;
    let next = WarmupState {
        day,
        last_update: Some(now),
        ..state.clone()
    };
    match state.plan.rate_for_day(day) {
        Some(rate) => WarmupStep::Advanced { state: next, rate },
        None => WarmupStep::Completed(WarmupState {
            enabled: false,
            ..next
        }),
    }
}
