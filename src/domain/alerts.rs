use chrono::{DateTime, TimeDelta, Utc};

pub const BUDGET_WARNING_PERCENT: f64 = 80.0;
pub const LONG_SESSION_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetAlert {
    Warning { used_percent: f64, remaining: f64 },
    Exceeded { used_percent: f64, spent: f64, budget: f64 },
}

pub fn budget_alert(spent: f64, budget: Option<f64>) -> Option<BudgetAlert> {
    let budget = budget.filter(|budget| *budget > 0.0)?;
    let used_percent = spent / budget * 100.0;

    if used_percent >= 100.0 {
        Some(BudgetAlert::Exceeded {
            used_percent,
            spent,
            budget,
        })
    } else if used_percent >= BUDGET_WARNING_PERCENT {
        Some(BudgetAlert::Warning {
            used_percent,
            remaining: budget - spent,
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAlert {
    LongRunning { elapsed: TimeDelta },
    MaxDurationReached { elapsed: TimeDelta, limit_hours: u32 },
}

pub fn session_alert(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_duration_hours: u32,
) -> Option<SessionAlert> {
    let elapsed = now - started_at;

    if max_duration_hours > 0 && elapsed >= TimeDelta::hours(i64::from(max_duration_hours)) {
        return Some(SessionAlert::MaxDurationReached {
            elapsed,
            limit_hours: max_duration_hours,
        });
    }

    (elapsed >= TimeDelta::hours(LONG_SESSION_HOURS))
        .then_some(SessionAlert::LongRunning { elapsed })
}
