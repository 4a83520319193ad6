use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::adapters::price_api::{DailyPriceSource, UPSTREAM_TIMEZONE};
use crate::domain::clock::Clock;
use crate::domain::models::Region;
use crate::domain::pricing::{PriceInterval, PricePoint, PriceProvider, average_price, hour_start};

pub const FAILED_FETCH_TTL_SECS: i64 = 60;

type DayKey = (Region, NaiveDate);

#[derive(Debug, Clone)]
enum CachedDay {
    Available {
        fetched_at: DateTime<Utc>,
        prices: Arc<Vec<PriceInterval>>,
    },
    Unavailable {
        fetched_at: DateTime<Utc>,
    },
}

impl CachedDay {
    fn is_fresh(&self, now: DateTime<Utc>, cache_ttl: TimeDelta) -> bool {
        match self {
            CachedDay::Available { fetched_at, .. } => now - *fetched_at < cache_ttl,
            CachedDay::Unavailable { fetched_at } => {
                now - *fetched_at < TimeDelta::seconds(FAILED_FETCH_TTL_SECS).min(cache_ttl)
            }
        }
    }
}

pub struct SpotPriceProvider<S, C> {
    source: S,
    clock: C,
    timezone: Tz,
    fetch_timeout: Duration,
    cache_ttl: TimeDelta,
    cache: Mutex<HashMap<DayKey, CachedDay>>,
    in_flight: Mutex<HashMap<DayKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, C> SpotPriceProvider<S, C>
where
    S: DailyPriceSource,
    C: Clock,
{
    pub fn new(source: S, clock: C, timezone: Tz, fetch_timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            source,
            clock,
            timezone,
            fetch_timeout,
            cache_ttl: TimeDelta::from_std(cache_ttl).unwrap_or_else(|_| TimeDelta::weeks(52)),
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: DayKey, now: DateTime<Utc>) -> Option<CachedDay> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&key)
            .filter(|entry| entry.is_fresh(now, self.cache_ttl))
            .cloned()
    }

    fn store(&self, key: DayKey, entry: CachedDay, now: DateTime<Utc>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, cached| cached.is_fresh(now, self.cache_ttl));
        cache.insert(key, entry);
    }

    fn fetch_lock(&self, key: DayKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(in_flight.entry(key).or_default())
    }

    async fn day_prices(&self, region: Region, date: NaiveDate) -> Option<Arc<Vec<PriceInterval>>> {
        let key = (region, date);

        if let Some(entry) = self.cached(key, self.clock.now()) {
            return available(entry);
        }

        // Concurrent misses on one day wait for a single upstream request.
        let lock = self.fetch_lock(key);
        let _guard = lock.lock().await;
        if let Some(entry) = self.cached(key, self.clock.now()) {
            return available(entry);
        }

        let fetched =
            tokio::time::timeout(self.fetch_timeout, self.source.fetch_day(region, date)).await;
        let fetched_at = self.clock.now();

        let entry = match fetched {
            Ok(Ok(prices)) => CachedDay::Available {
                fetched_at,
                prices: Arc::new(prices),
            },
            Ok(Err(error)) => {
                tracing::warn!(region = %region, %date, error = %error, "spot price fetch failed");
                CachedDay::Unavailable { fetched_at }
            }
            Err(_) => {
                tracing::warn!(
                    region = %region,
                    %date,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "spot price fetch timed out"
                );
                CachedDay::Unavailable { fetched_at }
            }
        };

        self.store(key, entry.clone(), fetched_at);
        available(entry)
    }
}

fn available(entry: CachedDay) -> Option<Arc<Vec<PriceInterval>>> {
    match entry {
        CachedDay::Available { prices, .. } => Some(prices),
        CachedDay::Unavailable { .. } => None,
    }
}

// Upstream dates whose day files cover `[from, to)`.
fn upstream_dates(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<NaiveDate> {
    let first = from.with_timezone(&UPSTREAM_TIMEZONE).date_naive();
    let last = (to - TimeDelta::milliseconds(1))
        .with_timezone(&UPSTREAM_TIMEZONE)
        .date_naive();
    first.iter_days().take_while(|date| *date <= last).collect()
}

#[async_trait]
impl<S, C> PriceProvider for SpotPriceProvider<S, C>
where
    S: DailyPriceSource,
    C: Clock,
{
    async fn price_for(&self, region: Region, hour: DateTime<Tz>) -> PricePoint {
        let hour = hour_start(hour.with_timezone(&self.timezone));
        let from = hour.with_timezone(&Utc);
        let to = from + TimeDelta::hours(1);

        let mut intervals = Vec::new();
        for date in upstream_dates(from, to) {
            let Some(prices) = self.day_prices(region, date).await else {
                return PricePoint::fallback(region, hour);
            };
            intervals.extend(prices.iter().copied());
        }

        match average_price(&intervals, from, to) {
            Some(price) => PricePoint::spot(region, hour, price),
            None => {
                tracing::warn!(region = %region, hour = %hour, "no valid spot price for hour");
                PricePoint::fallback(region, hour)
            }
        }
    }
}
