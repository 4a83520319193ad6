use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;

use crate::domain::models::Region;

pub const FALLBACK_PRICE_PER_KWH: f64 = 1.50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub region: Region,
    pub hour: DateTime<Tz>,
    pub price_per_kwh: f64,
    pub valid: bool,
}

impl PricePoint {
    pub fn spot(region: Region, hour: DateTime<Tz>, price_per_kwh: f64) -> Self {
        Self {
            region,
            hour,
            price_per_kwh,
            valid: true,
        }
    }

    pub fn fallback(region: Region, hour: DateTime<Tz>) -> Self {
        Self {
            region,
            hour,
            price_per_kwh: FALLBACK_PRICE_PER_KWH,
            valid: false,
        }
    }
}

// Implementations never fail; upstream trouble becomes a fallback price.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn price_for(&self, region: Region, hour: DateTime<Tz>) -> PricePoint;
}

#[async_trait]
impl<P: PriceProvider + ?Sized> PriceProvider for std::sync::Arc<P> {
    async fn price_for(&self, region: Region, hour: DateTime<Tz>) -> PricePoint {
        (**self).price_for(region, hour).await
    }
}

pub fn hour_start(instant: DateTime<Tz>) -> DateTime<Tz> {
    let into_hour = TimeDelta::minutes(i64::from(instant.minute()))
        + TimeDelta::seconds(i64::from(instant.second()))
        + TimeDelta::nanoseconds(i64::from(instant.nanosecond()));
    instant - into_hour
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceInterval {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub price_per_kwh: f64,
}

// `None` unless `[from, to)` is fully covered by finite, non-negative prices.
pub fn average_price(
    intervals: &[PriceInterval],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Option<f64> {
    if to <= from {
        return None;
    }

    let mut covered_ms = 0_i64;
    let mut weighted_sum = 0.0_f64;

    for interval in intervals {
        let overlap_start = interval.starts_at.max(from);
        let overlap_end = interval.ends_at.min(to);
        if overlap_end <= overlap_start {
            continue;
        }

        if !interval.price_per_kwh.is_finite() || interval.price_per_kwh < 0.0 {
            return None;
        }

        let overlap_ms = (overlap_end - overlap_start).num_milliseconds();
        covered_ms += overlap_ms;
        weighted_sum += interval.price_per_kwh * overlap_ms as f64;
    }

    let window_ms = (to - from).num_milliseconds();
    if covered_ms != window_ms {
        return None;
    }

    Some(weighted_sum / window_ms as f64)
}
