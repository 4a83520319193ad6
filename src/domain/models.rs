use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Region {
    #[default]
    No1,
    No2,
    No3,
    No4,
    No5,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown price region: {0}")]
pub struct RegionParseError(pub String);

const VAT_RATE: f64 = 0.25;

impl Region {
    pub const ALL: [Region; 5] = [
        Region::No1,
        Region::No2,
        Region::No3,
        Region::No4,
        Region::No5,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Region::No1 => "NO1",
            Region::No2 => "NO2",
            Region::No3 => "NO3",
            Region::No4 => "NO4",
            Region::No5 => "NO5",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Region::No1 => "Oslo / Øst-Norge",
            Region::No2 => "Kristiansand / Sør-Norge",
            Region::No3 => "Trondheim / Midt-Norge",
            Region::No4 => "Tromsø / Nord-Norge",
            Region::No5 => "Bergen / Vest-Norge",
        }
    }

    pub fn vat_multiplier(self) -> f64 {
        match self {
            Region::No4 => 1.0,
            _ => 1.0 + VAT_RATE,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = RegionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Region::ALL
            .into_iter()
            .find(|region| region.code() == normalized)
            .ok_or_else(|| RegionParseError(value.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WattMode {
    Low,
    High,
    Average,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown watt mode: {0}")]
pub struct WattModeParseError(pub String);

impl WattMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WattMode::Low => "low",
            WattMode::High => "high",
            WattMode::Average => "avg",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            WattMode::Low => "🔋",
            WattMode::High => "⚡",
            WattMode::Average => "📊",
        }
    }
}

impl fmt::Display for WattMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WattMode {
    type Err = WattModeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(WattMode::Low),
            "high" => Ok(WattMode::High),
            "avg" | "average" => Ok(WattMode::Average),
            other => Err(WattModeParseError(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("appliance name must not be empty")]
    EmptyName,
    #[error("wattage must be positive")]
    NonPositiveWattage,
    #[error("wattage cannot exceed {max}W, got {0}W", max = MAX_APPLIANCE_WATTS)]
    WattageTooHigh(u32),
    #[error("fixed cost cannot be negative")]
    NegativeFixedCost,
    #[error("billing period start day must be between 1 and 28, got {0}")]
    PeriodStartDay(u32),
}

pub const MAX_APPLIANCE_WATTS: u32 = 100_000;

// A reversed range is swapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppliance {
    pub name: String,
    pub low_watts: u32,
    pub high_watts: u32,
}

impl NewAppliance {
    pub fn new(name: &str, low_watts: u32, high_watts: u32) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if low_watts == 0 || high_watts == 0 {
            return Err(ValidationError::NonPositiveWattage);
        }
        if let Some(watts) = [low_watts, high_watts]
            .into_iter()
            .find(|watts| *watts > MAX_APPLIANCE_WATTS)
        {
            return Err(ValidationError::WattageTooHigh(watts));
        }

        Ok(Self {
            name: name.to_string(),
            low_watts: low_watts.min(high_watts),
            high_watts: low_watts.max(high_watts),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appliance {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    pub low_watts: u32,
    pub high_watts: u32,
    pub created_at: DateTime<Utc>,
}

impl Appliance {
    pub fn average_watts(&self) -> u32 {
        let (low, high) = (
            self.low_watts.min(self.high_watts),
            self.low_watts.max(self.high_watts),
        );
        low + (high - low) / 2
    }

    pub fn watts_for(&self, mode: WattMode) -> u32 {
        match mode {
            WattMode::Low => self.low_watts,
            WattMode::High => self.high_watts,
            WattMode::Average => self.average_watts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: UserId,
    pub appliance_id: String,
    pub appliance_name: String,
    pub watt_mode: WattMode,
    pub watts: u32,
    pub region: Region,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub id: String,
    pub user_id: UserId,
    pub appliance_id: Option<String>,
    pub appliance_name: String,
    pub watt_mode: WattMode,
    pub watts: u32,
    pub region: Region,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionCompletion {
    pub finished_at: DateTime<Utc>,
    pub kwh: f64,
    pub spot_cost: f64,
    pub fixed_cost: f64,
    pub total_cost: f64,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSession {
    pub id: String,
    pub appliance_name: String,
    pub watt_mode: WattMode,
    pub watts: u32,
    pub region: Region,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub kwh: f64,
    pub spot_cost: f64,
    pub fixed_cost: f64,
    pub total_cost: f64,
    pub fallback_used: bool,
}

pub const DEFAULT_FIXED_COST_PER_KWH: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct UserSettings {
    pub fixed_cost_per_kwh: f64,
    pub region: Region,
    pub monthly_budget: Option<f64>,
    pub period_start_day: u32,
    pub max_duration_hours: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            fixed_cost_per_kwh: DEFAULT_FIXED_COST_PER_KWH,
            region: Region::No1,
            monthly_budget: None,
            period_start_day: 1,
            max_duration_hours: 0,
        }
    }
}

impl UserSettings {
    pub fn with_fixed_cost(self, fixed_cost_per_kwh: f64) -> Result<Self, ValidationError> {
        if !fixed_cost_per_kwh.is_finite() || fixed_cost_per_kwh < 0.0 {
            return Err(ValidationError::NegativeFixedCost);
        }
        Ok(Self {
            fixed_cost_per_kwh,
            ..self
        })
    }

    pub fn with_budget(self, amount: f64) -> Self {
        let monthly_budget = (amount.is_finite() && amount > 0.0).then_some(amount);
        Self {
            monthly_budget,
            ..self
        }
    }

    pub fn with_region(self, region: Region) -> Self {
        Self { region, ..self }
    }

    pub fn with_period_start_day(self, day: u32) -> Result<Self, ValidationError> {
        if !(1..=28).contains(&day) {
            return Err(ValidationError::PeriodStartDay(day));
        }
        Ok(Self {
            period_start_day: day,
            ..self
        })
    }
}
