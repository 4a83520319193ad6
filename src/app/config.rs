use std::time::Duration;

use chrono_tz::Tz;

use crate::adapters::price_api::DEFAULT_PRICE_API_BASE;
use crate::app::AppError;
use crate::domain::session_cost::DEFAULT_MAX_SESSION_HOURS;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub db_path: String,
    pub price_api_base: String,
    pub price_fetch_timeout_ms: u64,
    pub price_cache_ttl_secs: u64,
    pub max_session_hours: i64,
    pub timezone: Tz,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        if let Err(error) = dotenvy::dotenv()
            && !error.not_found()
        {
            return Err(AppError::config(format!("failed to read .env file: {error}")));
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_bot_token = non_empty(&lookup, "TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| AppError::config("TELEGRAM_BOT_TOKEN is required"))?;

        let timezone = match non_empty(&lookup, "TIMEZONE") {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|_| AppError::config(format!("TIMEZONE {raw:?} is not a known IANA zone")))?,
            None => chrono_tz::Europe::Oslo,
        };

        let price_fetch_timeout_ms = parse_or_default(&lookup, "PRICE_FETCH_TIMEOUT_MS", 10_000_u64)?;
        if price_fetch_timeout_ms == 0 {
            return Err(AppError::config("PRICE_FETCH_TIMEOUT_MS must be positive"));
        }

        let max_session_hours =
            parse_or_default(&lookup, "MAX_SESSION_HOURS", DEFAULT_MAX_SESSION_HOURS)?;
        if max_session_hours <= 0 {
            return Err(AppError::config("MAX_SESSION_HOURS must be positive"));
        }

        Ok(Self {
            telegram_bot_token,
            db_path: non_empty(&lookup, "DB_PATH")
                .unwrap_or_else(|| "./stromtracker.db".to_string()),
            price_api_base: non_empty(&lookup, "PRICE_API_BASE")
                .unwrap_or_else(|| DEFAULT_PRICE_API_BASE.to_string()),
            price_fetch_timeout_ms,
            price_cache_ttl_secs: parse_or_default(&lookup, "PRICE_CACHE_TTL_SECS", 900_u64)?,
            max_session_hours,
            timezone,
        })
    }

    pub fn price_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.price_fetch_timeout_ms)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn rejects_missing_bot_token() {
        let result = AppConfig::from_lookup(|_| None);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: TELEGRAM_BOT_TOKEN is required"
        );
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let result = AppConfig::from_lookup(|key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
            _ => None,
        })
        .expect("config should be valid");

        assert_eq!(result.telegram_bot_token, "123:abc");
        assert_eq!(result.db_path, "./stromtracker.db");
        assert_eq!(
            result.price_api_base,
            "https://www.hvakosterstrommen.no/api/v1/prices"
        );
        assert_eq!(result.price_fetch_timeout_ms, 10_000);
        assert_eq!(result.price_cache_ttl_secs, 900);
        assert_eq!(result.max_session_hours, 744);
        assert_eq!(result.timezone, chrono_tz::Europe::Oslo);
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let result = AppConfig::from_lookup(|key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
            "PRICE_FETCH_TIMEOUT_MS" => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: PRICE_FETCH_TIMEOUT_MS must be a valid number"
        );
    }

    #[test]
    fn parses_timezone_and_rejects_unknown_zones() {
        let config = AppConfig::from_lookup(|key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
            "TIMEZONE" => Some("Asia/Kolkata".to_string()),
            _ => None,
        })
        .expect("config should be valid");
        assert_eq!(config.timezone, chrono_tz::Asia::Kolkata);

        let result = AppConfig::from_lookup(|key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
            "TIMEZONE" => Some("Mars/Olympus".to_string()),
            _ => None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_positive_limits() {
        let result = AppConfig::from_lookup(|key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
            "MAX_SESSION_HOURS" => Some("0".to_string()),
            _ => None,
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: MAX_SESSION_HOURS must be positive"
        );
    }
}
