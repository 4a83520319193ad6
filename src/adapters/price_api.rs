use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::models::Region;
use crate::domain::pricing::PriceInterval;

pub const DEFAULT_PRICE_API_BASE: &str = "https://www.hvakosterstrommen.no/api/v1/prices";

// Day files are published per Norwegian calendar date.
pub const UPSTREAM_TIMEZONE: chrono_tz::Tz = chrono_tz::Europe::Oslo;

#[derive(Debug, Error)]
pub enum PriceApiError {
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("price api returned status {0}")]
    Status(u16),
    #[error("price api returned no usable records")]
    Empty,
}

#[async_trait]
pub trait DailyPriceSource: Send + Sync {
    async fn fetch_day(
        &self,
        region: Region,
        date: NaiveDate,
    ) -> Result<Vec<PriceInterval>, PriceApiError>;
}

#[async_trait]
impl<T: DailyPriceSource + ?Sized> DailyPriceSource for std::sync::Arc<T> {
    async fn fetch_day(
        &self,
        region: Region,
        date: NaiveDate,
    ) -> Result<Vec<PriceInterval>, PriceApiError> {
        (**self).fetch_day(region, date).await
    }
}

#[derive(Debug, Deserialize)]
struct RawPriceEntry {
    #[serde(rename = "NOK_per_kWh")]
    nok_per_kwh: Option<f64>,
    time_start: DateTime<FixedOffset>,
    time_end: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
pub struct HvaKosterStrommenClient {
    client: reqwest::Client,
    base_url: String,
}

impl HvaKosterStrommenClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PriceApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stromtracker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn day_url(&self, region: Region, date: NaiveDate) -> String {
        format!(
            "{}/{}_{}.json",
            self.base_url,
            date.format("%Y/%m-%d"),
            region.code()
        )
    }
}

#[async_trait]
impl DailyPriceSource for HvaKosterStrommenClient {
    async fn fetch_day(
        &self,
        region: Region,
        date: NaiveDate,
    ) -> Result<Vec<PriceInterval>, PriceApiError> {
        let url = self.day_url(region, date);
        tracing::debug!(%url, "fetching spot prices");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PriceApiError::Status(status.as_u16()));
        }

        let entries: Vec<Value> = response.json().await?;
        let intervals = parse_entries(region, entries);
        if intervals.is_empty() {
            return Err(PriceApiError::Empty);
        }

        tracing::info!(
            region = %region,
            %date,
            records = intervals.len(),
            "spot prices fetched"
        );

        Ok(intervals)
    }
}

fn parse_entries(region: Region, entries: Vec<Value>) -> Vec<PriceInterval> {
    let vat = region.vat_multiplier();
    let mut intervals = Vec::with_capacity(entries.len());

    for entry in entries {
        let raw = match serde_json::from_value::<RawPriceEntry>(entry) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(region = %region, error = %error, "skipping malformed price record");
                continue;
            }
        };

        if raw.time_end <= raw.time_start {
            tracing::warn!(
                region = %region,
                time_start = %raw.time_start,
                "skipping price record with empty interval"
            );
            continue;
        }

        intervals.push(PriceInterval {
            starts_at: raw.time_start.with_timezone(&Utc),
            ends_at: raw.time_end.with_timezone(&Utc),
            price_per_kwh: raw.nok_per_kwh.map_or(f64::NAN, |price| price * vat),
        });
    }

    intervals.sort_by_key(|interval| interval.starts_at);
    intervals
}
