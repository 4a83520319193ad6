use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::domain::models::Region;
use crate::domain::pricing::{PricePoint, PriceProvider, hour_start};

pub const DEFAULT_MAX_SESSION_HOURS: i64 = 31 * 24;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub region: Region,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourSegment {
    pub hour: DateTime<Tz>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HourSegment {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourCost {
    pub hour: DateTime<Tz>,
    pub duration: TimeDelta,
    pub kwh: f64,
    pub price: PricePoint,
    pub spot_cost: f64,
    pub fixed_cost: f64,
}

impl HourCost {
    pub fn total_cost(&self) -> f64 {
        self.spot_cost + self.fixed_cost
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    pub region: Region,
    pub watts: u32,
    pub fixed_cost_per_kwh: f64,
    pub duration: TimeDelta,
    pub hours: Vec<HourCost>,
    pub kwh: f64,
    pub spot_cost: f64,
    pub fixed_cost: f64,
    pub total_cost: f64,
    pub fallback_used: bool,
}

impl CostBreakdown {
    fn empty(region: Region, watts: u32, fixed_cost_per_kwh: f64, duration: TimeDelta) -> Self {
        Self {
            region,
            watts,
            fixed_cost_per_kwh,
            duration,
            hours: Vec::new(),
            kwh: 0.0,
            spot_cost: 0.0,
            fixed_cost: 0.0,
            total_cost: 0.0,
            fallback_used: false,
        }
    }

    pub fn average_spot_price(&self) -> Option<f64> {
        (self.kwh > 0.0).then(|| self.spot_cost / self.kwh)
    }

    fn push(&mut self, hour_cost: HourCost) {
        self.kwh += hour_cost.kwh;
        self.spot_cost += hour_cost.spot_cost;
        self.fixed_cost += hour_cost.fixed_cost;
        self.total_cost += hour_cost.total_cost();
        self.fallback_used |= !hour_cost.price.valid;
        self.hours.push(hour_cost);
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CostError {
    #[error("appliance wattage must be positive")]
    ZeroWattage,
    #[error("session ends ({end}) before it starts ({start})")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("session lasts {duration_hours:.1}h, longer than the {max_hours}h limit")]
    DurationExceeded { duration_hours: f64, max_hours: i64 },
    #[error("fixed cost must be a non-negative number, got {0}")]
    InvalidFixedCost(f64),
}

pub fn partition_hours(start: DateTime<Utc>, end: DateTime<Utc>, timezone: Tz) -> Vec<HourSegment> {
    let mut segments = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let hour = hour_start(cursor.with_timezone(&timezone));
        let next_boundary = hour.with_timezone(&Utc) + TimeDelta::hours(1);
        let segment_end = next_boundary.min(end);

        segments.push(HourSegment {
            hour,
            start: cursor,
            end: segment_end,
        });
        cursor = segment_end;
    }

    segments
}

pub struct SessionAccountant<P> {
    provider: P,
    timezone: Tz,
    max_duration: TimeDelta,
}

impl<P> SessionAccountant<P>
where
    P: PriceProvider,
{
    pub fn new(provider: P, timezone: Tz, max_duration_hours: i64) -> Self {
        Self {
            provider,
            timezone,
            max_duration: TimeDelta::hours(max_duration_hours.max(1)),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub async fn compute(
        &self,
        session: &SessionWindow,
        watts: u32,
        fixed_cost_per_kwh: f64,
    ) -> Result<CostBreakdown, CostError> {
        self.validate(session, watts, fixed_cost_per_kwh)?;

        let duration = session.end - session.start;
        let mut breakdown =
            CostBreakdown::empty(session.region, watts, fixed_cost_per_kwh, duration);
        if duration.is_zero() {
            return Ok(breakdown);
        }

        let kilowatts = f64::from(watts) / 1000.0;

        for segment in partition_hours(session.start, session.end, self.timezone) {
            let price = self.provider.price_for(session.region, segment.hour).await;
            let kwh = kilowatts * (segment.duration().num_milliseconds() as f64 / MS_PER_HOUR);

            breakdown.push(HourCost {
                hour: segment.hour,
                duration: segment.duration(),
                kwh,
                price,
                spot_cost: kwh * price.price_per_kwh,
                fixed_cost: kwh * fixed_cost_per_kwh,
            });
        }

        if breakdown.fallback_used {
            tracing::warn!(
                region = %session.region,
                hours = breakdown.hours.len(),
                fallback_hours = breakdown.hours.iter().filter(|hour| !hour.price.valid).count(),
                "session priced partly with fallback"
            );
        }

        Ok(breakdown)
    }

    fn validate(
        &self,
        session: &SessionWindow,
        watts: u32,
        fixed_cost_per_kwh: f64,
    ) -> Result<(), CostError> {
        if watts == 0 {
            return Err(CostError::ZeroWattage);
        }

        if session.end < session.start {
            return Err(CostError::EndBeforeStart {
                start: session.start,
                end: session.end,
            });
        }

        let duration = session.end - session.start;
        if duration > self.max_duration {
            return Err(CostError::DurationExceeded {
                duration_hours: duration.num_milliseconds() as f64 / MS_PER_HOUR,
                max_hours: self.max_duration.num_hours(),
            });
        }

        if !fixed_cost_per_kwh.is_finite() || fixed_cost_per_kwh < 0.0 {
            return Err(CostError::InvalidFixedCost(fixed_cost_per_kwh));
        }

        Ok(())
    }
}
