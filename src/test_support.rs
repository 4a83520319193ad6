use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;

use crate::adapters::db::{open_connection, run_migrations};
use crate::domain::clock::Clock;
use crate::domain::models::Region;
use crate::domain::pricing::{PricePoint, PriceProvider, hour_start};

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, value: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = value;
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock().expect("clock lock") += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

pub fn temp_db_path(name: &str) -> PathBuf {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join(name);
    std::mem::forget(dir);
    path
}

pub fn open_test_connection(test_name: &str) -> Connection {
    let path = temp_db_path(&format!("{test_name}.sqlite"));
    let mut connection =
        open_connection(path.to_string_lossy().as_ref()).expect("test db should open");
    run_migrations(&mut connection).expect("test migrations should succeed");
    connection
}

#[derive(Debug, Clone)]
pub struct StubPriceProvider {
    default_price: Option<f64>,
    overrides: HashMap<DateTime<Utc>, Option<f64>>,
    requested: Arc<Mutex<Vec<DateTime<Tz>>>>,
}

impl StubPriceProvider {
    pub fn flat(price: f64) -> Self {
        Self {
            default_price: Some(price),
            overrides: HashMap::new(),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_price(mut self, hour: DateTime<Utc>, price: f64) -> Self {
        self.overrides.insert(hour, Some(price));
        self
    }

    pub fn without_hour(mut self, hour: DateTime<Utc>) -> Self {
        self.overrides.insert(hour, None);
        self
    }

    pub fn requested_hours(&self) -> Vec<DateTime<Tz>> {
        self.requested.lock().expect("stub lock").clone()
    }
}

#[async_trait]
impl PriceProvider for StubPriceProvider {
    async fn price_for(&self, region: Region, hour: DateTime<Tz>) -> PricePoint {
        let hour = hour_start(hour);
        self.requested.lock().expect("stub lock").push(hour);

        let price = match self.overrides.get(&hour.with_timezone(&Utc)) {
            Some(price) => *price,
            None => self.default_price,
        };

        match price {
            Some(price) => PricePoint::spot(region, hour, price),
            None => PricePoint::fallback(region, hour),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FailingPriceProvider;

#[async_trait]
impl PriceProvider for FailingPriceProvider {
    async fn price_for(&self, region: Region, hour: DateTime<Tz>) -> PricePoint {
        PricePoint::fallback(region, hour_start(hour))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::ManualClock;
    use crate::domain::clock::Clock;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::minutes(90));
        assert_eq!(clock.now(), start + TimeDelta::minutes(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
