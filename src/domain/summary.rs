use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::models::CompletedSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    pub fn for_month(year: i32, month: u32, start_day: u32) -> Option<Self> {
        let start_day = start_day.clamp(1, 28);
        let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)?;

        if start_day == 1 {
            return Some(Self {
                start: first_of_month,
                end: first_of_month.checked_add_months(Months::new(1))?,
            });
        }

        let end = NaiveDate::from_ymd_opt(year, month, start_day)?;
        let start = end.checked_sub_months(Months::new(1))?;
        Some(Self { start, end })
    }

    pub fn containing(date: NaiveDate, start_day: u32) -> Option<Self> {
        let start_day = start_day.clamp(1, 28);
        if start_day == 1 || date.day() < start_day {
            return Self::for_month(date.year(), date.month(), start_day);
        }

        let next = date.checked_add_months(Months::new(1))?;
        Self::for_month(next.year(), next.month(), start_day)
    }

    pub fn label_month(&self) -> (i32, u32) {
        let last_day = self.end.pred_opt().unwrap_or(self.start);
        (last_day.year(), last_day.month())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn utc_bounds(&self, timezone: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            local_midnight(timezone, self.start),
            local_midnight(timezone, self.end),
        )
    }
}

fn local_midnight(timezone: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    timezone
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub period: BillingPeriod,
    pub session_count: usize,
    pub total_kwh: f64,
    pub spot_cost: f64,
    pub fixed_cost: f64,
    pub total_cost: f64,
    pub budget: Option<f64>,
}

impl MonthlySummary {
    pub fn from_sessions(
        year: i32,
        month: u32,
        period: BillingPeriod,
        sessions: &[CompletedSession],
        budget: Option<f64>,
    ) -> Self {
        Self {
            year,
            month,
            period,
            session_count: sessions.len(),
            total_kwh: sessions.iter().map(|session| session.kwh).sum(),
            spot_cost: sessions.iter().map(|session| session.spot_cost).sum(),
            fixed_cost: sessions.iter().map(|session| session.fixed_cost).sum(),
            total_cost: sessions.iter().map(|session| session.total_cost).sum(),
            budget,
        }
    }

    pub fn average_price_per_kwh(&self) -> f64 {
        if self.total_kwh > 0.0 {
            self.total_cost / self.total_kwh
        } else {
            0.0
        }
    }

    pub fn remaining_budget(&self) -> Option<f64> {
        self.budget.map(|budget| budget - self.total_cost)
    }

    pub fn budget_used_percent(&self) -> Option<f64> {
        self.budget
            .filter(|budget| *budget > 0.0)
            .map(|budget| self.total_cost / budget * 100.0)
    }
}
