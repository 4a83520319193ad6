use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};

use crate::adapters::db::DbError;
use crate::adapters::render;
use crate::app::services::{ServiceError, TrackerCommandHandler, TrackerQueryHandler};
use crate::domain::alerts::{budget_alert, session_alert};
use crate::domain::clock::Clock;
use crate::domain::command::Command;
use crate::domain::models::{
    ActiveSession, Appliance, NewAppliance, NewSession, Region, SessionCompletion, UserId,
    UserSettings, WattMode,
};
use crate::domain::pricing::PriceProvider;
use crate::domain::session_cost::{CostBreakdown, CostError, SessionAccountant, SessionWindow};
use crate::domain::summary::{BillingPeriod, MonthlySummary};

pub const HISTORY_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub command: Command,
}

impl Button {
    pub fn new(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<Button>>) -> Self {
        self.buttons = buttons;
        self
    }
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, user: UserId, command: Command) -> Result<Vec<Reply>, ServiceError>;
}

pub struct TrackerBot<S, P, C> {
    store: S,
    accountant: SessionAccountant<P>,
    clock: C,
}

impl<S, P, C> TrackerBot<S, P, C>
where
    S: TrackerQueryHandler + TrackerCommandHandler + Send + Sync,
    P: PriceProvider,
    C: Clock,
{
    pub fn new(store: S, accountant: SessionAccountant<P>, clock: C) -> Self {
        Self {
            store,
            accountant,
            clock,
        }
    }

    fn today(&self) -> chrono::NaiveDate {
        self.clock
            .now()
            .with_timezone(&self.accountant.timezone())
            .date_naive()
    }

    fn start(&self, user: UserId) -> Result<Vec<Reply>, ServiceError> {
        if !self.store.has_settings(user)? {
            self.store
                .save_user_settings(user, &UserSettings::default())?;
            tracing::info!(user_id = %user, "new user registered");
        }
        Ok(vec![Reply::text(render::welcome())])
    }

    fn add(
        &self,
        user: UserId,
        name: &str,
        low_watts: u32,
        high_watts: u32,
    ) -> Result<Vec<Reply>, ServiceError> {
        let appliance = match NewAppliance::new(name, low_watts, high_watts) {
            Ok(appliance) => appliance,
            Err(error) => return Ok(vec![Reply::text(render::validation_error(&error))]),
        };

        let reply = match self
            .store
            .add_appliance(user, &appliance, self.clock.now())?
        {
            Some(created) => {
                tracing::info!(user_id = %user, appliance = %created.name, "appliance added");
                render::appliance_added(&created)
            }
            None => render::appliance_exists(&appliance.name),
        };
        Ok(vec![Reply::text(reply)])
    }

    fn delete(&self, user: UserId, name: Option<&str>) -> Result<Vec<Reply>, ServiceError> {
        let Some(name) = name else {
            let appliances = self.store.appliances(user)?;
            if appliances.is_empty() {
                return Ok(vec![Reply::text(render::no_appliances())]);
            }
            let buttons = appliance_buttons(&appliances, |name| Command::Delete {
                name: Some(name),
            });
            return Ok(vec![
                Reply::text(render::select_appliance_to_delete()).with_buttons(buttons),
            ]);
        };

        let reply = if self.store.delete_appliance(user, name)? {
            tracing::info!(user_id = %user, appliance = %name, "appliance deleted");
            render::appliance_deleted(name)
        } else {
            render::appliance_not_found(name)
        };
        Ok(vec![Reply::text(reply)])
    }

    async fn use_appliance(
        &self,
        user: UserId,
        name: Option<&str>,
        mode: Option<WattMode>,
    ) -> Result<Vec<Reply>, ServiceError> {
        if let Some(active) = self.store.active_session(user)? {
            return Ok(vec![Reply::text(render::already_tracking(&active))]);
        }

        let Some(name) = name else {
            let appliances = self.store.appliances(user)?;
            if appliances.is_empty() {
                return Ok(vec![Reply::text(render::no_appliances())]);
            }
            let buttons = appliance_buttons(&appliances, |name| Command::Use {
                name: Some(name),
                mode: None,
            });
            return Ok(vec![
                Reply::text(render::select_appliance_to_use()).with_buttons(buttons),
            ]);
        };

        let Some(appliance) = self.store.appliance(user, name)? else {
            return Ok(vec![Reply::text(render::appliance_not_found(name))]);
        };
        let settings = self.store.user_settings(user)?;

        match mode {
            None => {
                let price = self.current_price(settings.region).await;
                let reply = Reply::text(render::watt_mode_prompt(
                    &appliance,
                    &settings,
                    Some(&price),
                ))
                .with_buttons(watt_mode_buttons(&appliance));
                Ok(vec![reply])
            }
            Some(mode) => self.start_session(user, &appliance, mode, settings.region).await,
        }
    }

    async fn start_session(
        &self,
        user: UserId,
        appliance: &Appliance,
        mode: WattMode,
        region: Region,
    ) -> Result<Vec<Reply>, ServiceError> {
        let new_session = NewSession {
            user_id: user,
            appliance_id: appliance.id.clone(),
            appliance_name: appliance.name.clone(),
            watt_mode: mode,
            watts: appliance.watts_for(mode),
            region,
            started_at: self.clock.now(),
        };

        let session = match self.store.start_session(&new_session) {
            Ok(session) => session,
            Err(ServiceError::Database(DbError::SessionAlreadyActive(_))) => {
                return match self.store.active_session(user)? {
                    Some(active) => Ok(vec![Reply::text(render::already_tracking(&active))]),
                    None => Ok(vec![Reply::text(render::generic_failure())]),
                };
            }
            Err(error) => return Err(error),
        };

        tracing::info!(
            user_id = %user,
            session_id = %session.id,
            appliance = %session.appliance_name,
            watts = session.watts,
            region = %session.region,
            "session started"
        );

        let price = self.current_price(region).await;
        Ok(vec![
            Reply::text(render::session_started(
                &session,
                self.accountant.timezone(),
                &price,
            ))
            .with_buttons(session_buttons()),
        ])
    }

    async fn current_price(&self, region: Region) -> crate::domain::pricing::PricePoint {
        let now = self.clock.now().with_timezone(&self.accountant.timezone());
        self.accountant.provider().price_for(region, now).await
    }

    async fn price_session(
        &self,
        session: &ActiveSession,
        end: DateTime<Utc>,
        settings: &UserSettings,
    ) -> Result<CostBreakdown, CostError> {
        let window = SessionWindow {
            start: session.started_at,
            end,
            region: session.region,
        };
        self.accountant
            .compute(&window, session.watts, settings.fixed_cost_per_kwh)
            .await
    }

    fn current_summary(
        &self,
        user: UserId,
        settings: &UserSettings,
    ) -> Result<Option<MonthlySummary>, ServiceError> {
        let Some(period) = BillingPeriod::containing(self.today(), settings.period_start_day)
        else {
            return Ok(None);
        };
        let (year, month) = period.label_month();
        self.summary_for(user, settings, year, month, period).map(Some)
    }

    fn summary_for(
        &self,
        user: UserId,
        settings: &UserSettings,
        year: i32,
        month: u32,
        period: BillingPeriod,
    ) -> Result<MonthlySummary, ServiceError> {
        let (from, to) = period.utc_bounds(self.accountant.timezone());
        let sessions = self.store.sessions_finished_between(user, from, to)?;
        Ok(MonthlySummary::from_sessions(
            year,
            month,
            period,
            &sessions,
            settings.monthly_budget,
        ))
    }

    async fn stop(&self, user: UserId) -> Result<Vec<Reply>, ServiceError> {
        let Some(session) = self.store.active_session(user)? else {
            return Ok(vec![Reply::text(render::no_active_session())]);
        };
        let settings = self.store.user_settings(user)?;
        let finished_at = self.clock.now();

        let breakdown = match self.price_session(&session, finished_at, &settings).await {
            Ok(breakdown) => breakdown,
            Err(error) => {
                tracing::warn!(
                    user_id = %user,
                    session_id = %session.id,
                    error = %error,
                    "session could not be priced"
                );
                return Ok(vec![
                    Reply::text(render::stop_failed(&error)).with_buttons(vec![vec![
                        Button::new("🚫 Cancel session", Command::Cancel),
                    ]]),
                ]);
            }
        };

        let completion = SessionCompletion {
            finished_at,
            kwh: breakdown.kwh,
            spot_cost: breakdown.spot_cost,
            fixed_cost: breakdown.fixed_cost,
            total_cost: breakdown.total_cost,
            fallback_used: breakdown.fallback_used,
        };
        if !self.store.finish_session(&session.id, &completion)? {
            return Ok(vec![Reply::text(render::no_active_session())]);
        }

        tracing::info!(
            user_id = %user,
            session_id = %session.id,
            kwh = breakdown.kwh,
            total_cost = breakdown.total_cost,
            hours = breakdown.hours.len(),
            fallback_used = breakdown.fallback_used,
            "session stopped"
        );

        let Some(summary) = self.current_summary(user, &settings)? else {
            return Ok(vec![Reply::text(render::generic_failure())]);
        };

        let mut replies = vec![Reply::text(render::session_stopped(
            &session, &breakdown, &summary,
        ))];
        if let Some(alert) = budget_alert(summary.total_cost, settings.monthly_budget) {
            replies.push(Reply::text(render::budget_alert(&alert)));
        }
        Ok(replies)
    }

    fn cancel(&self, user: UserId) -> Result<Vec<Reply>, ServiceError> {
        let Some(session) = self.store.active_session(user)? else {
            return Ok(vec![Reply::text(render::no_session_to_cancel())]);
        };
        let now = self.clock.now();

        if !self.store.cancel_session(&session.id, now)? {
            return Ok(vec![Reply::text(render::no_session_to_cancel())]);
        }

        tracing::info!(user_id = %user, session_id = %session.id, "session cancelled");
        Ok(vec![Reply::text(render::session_cancelled(
            &session,
            now - session.started_at,
        ))])
    }

    async fn status(&self, user: UserId) -> Result<Vec<Reply>, ServiceError> {
        let Some(session) = self.store.active_session(user)? else {
            return Ok(vec![Reply::text(render::no_active_session())]);
        };
        let settings = self.store.user_settings(user)?;
        let now = self.clock.now();

        let text = match self.price_session(&session, now, &settings).await {
            Ok(estimate) => render::session_status(&session, &estimate),
            Err(error) => render::status_unavailable(&session, &error),
        };

        let mut replies = vec![Reply::text(text).with_buttons(vec![vec![
            Button::new("⏹ Stop", Command::Stop),
            Button::new("🚫 Cancel", Command::Cancel),
        ]])];
        if let Some(alert) = session_alert(session.started_at, now, settings.max_duration_hours) {
            replies.push(Reply::text(render::session_alert(
                &alert,
                &session.appliance_name,
            )));
        }
        Ok(replies)
    }

    fn month(
        &self,
        user: UserId,
        month: Option<u32>,
        year: Option<i32>,
    ) -> Result<Vec<Reply>, ServiceError> {
        let settings = self.store.user_settings(user)?;
        let today = self.today();
        let current = BillingPeriod::containing(today, settings.period_start_day);

        let (year, month) = match (month, current) {
            (None, Some(period)) => period.label_month(),
            (None, None) => (today.year(), today.month()),
            (Some(month), _) => (year.unwrap_or(today.year()), month),
        };

        let Some(period) = BillingPeriod::for_month(year, month, settings.period_start_day) else {
            return Ok(vec![Reply::text(render::invalid_period(month, year))]);
        };
        let summary = self.summary_for(user, &settings, year, month, period)?;
        let is_current = period.contains(today);

        Ok(vec![Reply::text(render::month_summary(
            &summary,
            settings.region,
            is_current,
        ))])
    }

    fn history(&self, user: UserId) -> Result<Vec<Reply>, ServiceError> {
        let sessions = self.store.recent_sessions(user, HISTORY_LIMIT)?;
        Ok(vec![Reply::text(render::history(
            &sessions,
            self.accountant.timezone(),
        ))])
    }

    fn budget(&self, user: UserId, amount: Option<f64>) -> Result<Vec<Reply>, ServiceError> {
        let settings = self.store.user_settings(user)?;

        let Some(amount) = amount else {
            let text = match self.current_summary(user, &settings)? {
                Some(summary) => render::budget_status(&summary),
                None => render::generic_failure(),
            };
            return Ok(vec![Reply::text(text)]);
        };

        let updated = settings.with_budget(amount);
        self.store.save_user_settings(user, &updated)?;
        tracing::info!(user_id = %user, budget = ?updated.monthly_budget, "budget updated");
        Ok(vec![Reply::text(render::budget_set(&updated))])
    }

    fn set_fixed_cost(&self, user: UserId, amount: Option<f64>) -> Result<Vec<Reply>, ServiceError> {
        let settings = self.store.user_settings(user)?;

        let Some(amount) = amount else {
            return Ok(vec![Reply::text(render::fixed_cost_status(&settings))]);
        };

        match settings.with_fixed_cost(amount) {
            Ok(updated) => {
                self.store.save_user_settings(user, &updated)?;
                tracing::info!(user_id = %user, fixed_cost = amount, "fixed cost updated");
                Ok(vec![Reply::text(render::fixed_cost_set(&updated))])
            }
            Err(error) => Ok(vec![Reply::text(render::validation_error(&error))]),
        }
    }

    fn set_region(&self, user: UserId, region: Option<Region>) -> Result<Vec<Reply>, ServiceError> {
        let settings = self.store.user_settings(user)?;

        let Some(region) = region else {
            let buttons = Region::ALL
                .chunks(3)
                .map(|row| {
                    row.iter()
                        .map(|region| {
                            Button::new(
                                region.code(),
                                Command::SetRegion {
                                    region: Some(*region),
                                },
                            )
                        })
                        .collect()
                })
                .collect();
            return Ok(vec![
                Reply::text(render::region_prompt(&settings)).with_buttons(buttons),
            ]);
        };

        self.store
            .save_user_settings(user, &settings.with_region(region))?;
        tracing::info!(user_id = %user, region = %region, "region updated");
        Ok(vec![Reply::text(render::region_set(region))])
    }

    fn set_period(&self, user: UserId, day: Option<u32>) -> Result<Vec<Reply>, ServiceError> {
        let settings = self.store.user_settings(user)?;

        let Some(day) = day else {
            return Ok(vec![Reply::text(render::period_status(&settings))]);
        };

        match settings.with_period_start_day(day) {
            Ok(updated) => {
                self.store.save_user_settings(user, &updated)?;
                tracing::info!(user_id = %user, period_start_day = day, "billing period updated");
                Ok(vec![Reply::text(render::period_set(&updated))])
            }
            Err(error) => Ok(vec![Reply::text(render::validation_error(&error))]),
        }
    }

    fn config(&self, user: UserId) -> Result<Vec<Reply>, ServiceError> {
        let settings = self.store.user_settings(user)?;
        let appliances = self.store.appliances(user)?;
        Ok(vec![Reply::text(render::config(&settings, &appliances))])
    }

    fn clear(&self, user: UserId, confirmed: bool) -> Result<Vec<Reply>, ServiceError> {
        if confirmed {
            let deleted = self.store.clear_sessions(user)?;
            tracing::info!(user_id = %user, deleted, "session history cleared");
            return Ok(vec![Reply::text(render::cleared(deleted))]);
        }

        let totals = self.store.session_totals(user)?;
        if totals.count == 0 {
            return Ok(vec![Reply::text(render::nothing_to_clear())]);
        }

        Ok(vec![
            Reply::text(render::clear_confirmation(&totals)).with_buttons(vec![vec![
                Button::new("✅ Yes, clear all", Command::Clear { confirmed: true }),
                Button::new("❌ Cancel", Command::Dismiss),
            ]]),
        ])
    }
}

#[async_trait]
impl<S, P, C> RequestHandler for TrackerBot<S, P, C>
where
    S: TrackerQueryHandler + TrackerCommandHandler + Send + Sync,
    P: PriceProvider,
    C: Clock,
{
    async fn handle(&self, user: UserId, command: Command) -> Result<Vec<Reply>, ServiceError> {
        tracing::debug!(user_id = %user, ?command, "handling command");

        match command {
            Command::Start => self.start(user),
            Command::Help => Ok(vec![Reply::text(render::help())]),
            Command::Add {
                name,
                low_watts,
                high_watts,
            } => self.add(user, &name, low_watts, high_watts),
            Command::List => Ok(vec![Reply::text(render::appliance_list(
                &self.store.appliances(user)?,
            ))]),
            Command::Delete { name } => self.delete(user, name.as_deref()),
            Command::Use { name, mode } => self.use_appliance(user, name.as_deref(), mode).await,
            Command::Stop => self.stop(user).await,
            Command::Cancel => self.cancel(user),
            Command::Status => self.status(user).await,
            Command::Month { month, year } => self.month(user, month, year),
            Command::History => self.history(user),
            Command::Budget { amount } => self.budget(user, amount),
            Command::SetFixedCost { amount } => self.set_fixed_cost(user, amount),
            Command::SetRegion { region } => self.set_region(user, region),
            Command::SetPeriod { day } => self.set_period(user, day),
            Command::Config => self.config(user),
            Command::Clear { confirmed } => self.clear(user, confirmed),
            Command::Dismiss => Ok(vec![Reply::text(render::dismissed())]),
        }
    }
}

fn appliance_buttons(
    appliances: &[Appliance],
    command: impl Fn(String) -> Command,
) -> Vec<Vec<Button>> {
    let mut rows: Vec<Vec<Button>> = appliances
        .chunks(2)
        .map(|row| {
            row.iter()
                .map(|appliance| Button::new(appliance.name.clone(), command(appliance.name.clone())))
                .collect()
        })
        .collect();
    rows.push(vec![Button::new("❌ Cancel", Command::Dismiss)]);
    rows
}

fn watt_mode_buttons(appliance: &Appliance) -> Vec<Vec<Button>> {
    let mode_button = |mode: WattMode| {
        Button::new(
            format!(
                "{} {} ({}W)",
                mode.emoji(),
                mode,
                appliance.watts_for(mode)
            ),
            Command::Use {
                name: Some(appliance.name.clone()),
                mode: Some(mode),
            },
        )
    };

    vec![
        vec![mode_button(WattMode::Low), mode_button(WattMode::High)],
        vec![mode_button(WattMode::Average)],
        vec![Button::new("❌ Cancel", Command::Dismiss)],
    ]
}

fn session_buttons() -> Vec<Vec<Button>> {
    vec![vec![
        Button::new("⏹ Stop", Command::Stop),
        Button::new("📊 Status", Command::Status),
        Button::new("🚫 Cancel", Command::Cancel),
    ]]
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use chrono_tz::Europe::Oslo;

    use super::{Reply, RequestHandler, TrackerBot};
    use crate::app::services::{SqliteTrackerService, TrackerQueryHandler};
    use crate::domain::command::Command;
    use crate::domain::models::{Region, UserId, WattMode};
    use crate::domain::session_cost::{DEFAULT_MAX_SESSION_HOURS, SessionAccountant};
    use crate::test_support::{
        FailingPriceProvider, ManualClock, StubPriceProvider, open_test_connection,
    };

    const USER: UserId = UserId(1001);

    type Bot<P> = TrackerBot<SqliteTrackerService, P, Arc<ManualClock>>;

    fn oslo(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Oslo.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn bot<P: crate::domain::pricing::PriceProvider>(
        name: &str,
        provider: P,
        start: DateTime<Utc>,
    ) -> (Bot<P>, Arc<ManualClock>, SqliteTrackerService) {
        let store = SqliteTrackerService::new(Arc::new(Mutex::new(open_test_connection(name))));
        let clock = Arc::new(ManualClock::new(start));
        let accountant = SessionAccountant::new(provider, Oslo, DEFAULT_MAX_SESSION_HOURS);
        (
            TrackerBot::new(store.clone(), accountant, Arc::clone(&clock)),
            clock,
            store,
        )
    }

    async fn send<P: crate::domain::pricing::PriceProvider>(bot: &Bot<P>, command: Command) -> Vec<Reply> {
        bot.handle(USER, command)
            .await
            .expect("command should be handled")
    }

    fn add_heater() -> Command {
        Command::Add {
            name: "Heater".to_string(),
            low_watts: 750,
            high_watts: 1500,
        }
    }

    fn use_heater(mode: WattMode) -> Command {
        Command::Use {
            name: Some("Heater".to_string()),
            mode: Some(mode),
        }
    }

    #[tokio::test]
    async fn start_registers_default_settings_once() {
        let (bot, _, store) = bot("bot-start", StubPriceProvider::flat(1.0), oslo(2025, 2, 3, 9, 0));

        send(&bot, Command::SetRegion { region: Some(Region::No5) }).await;
        let replies = send(&bot, Command::Start).await;

        assert!(replies[0].text.contains("Welcome"));
        assert_eq!(store.user_settings(USER).expect("query").region, Region::No5);
    }

    #[tokio::test]
    async fn tracks_the_worked_example_end_to_end() {
        let (bot, clock, store) =
            bot("bot-worked", StubPriceProvider::flat(2.0), oslo(2025, 2, 3, 9, 30));

        send(&bot, add_heater()).await;
        let started = send(&bot, use_heater(WattMode::High)).await;
        assert!(started[0].text.contains("Session started"));
        assert!(started[0].text.contains("Heater @ 1500W"));
        assert_eq!(started[0].buttons[0].len(), 3);

        clock.set(oslo(2025, 2, 3, 11, 15));
        let stopped = send(&bot, Command::Stop).await;

        assert_eq!(stopped.len(), 1);
        assert!(stopped[0].text.contains("Duration: 1h 45m"));
        assert!(stopped[0].text.contains("Spot (NO1): 2.00 kr/kWh"));
        assert!(stopped[0].text.contains("February total:"));
        assert!(stopped[0].text.contains("(1 sessions)"));
        assert!(store.active_session(USER).expect("query").is_none());

        let history = store.recent_sessions(USER, 10).expect("query");
        assert!((history[0].total_cost - 7.875).abs() < 1e-9);
        assert!(!history[0].fallback_used);
    }

    #[tokio::test]
    async fn rejects_appliances_with_implausible_wattage() {
        let (bot, _, store) = bot("bot-big", StubPriceProvider::flat(1.0), oslo(2025, 2, 3, 9, 0));

        let replies = send(
            &bot,
            Command::Add {
                name: "Big".to_string(),
                low_watts: 3_000_000_000,
                high_watts: 3_000_000_000,
            },
        )
        .await;

        assert!(replies[0].text.contains("Wattage cannot exceed 100000W"));
        assert!(store.appliances(USER).expect("query").is_empty());
    }

    #[tokio::test]
    async fn refuses_a_second_concurrent_session() {
        let (bot, _, _) = bot("bot-concurrent", StubPriceProvider::flat(1.0), oslo(2025, 2, 3, 9, 0));

        send(&bot, add_heater()).await;
        send(&bot, use_heater(WattMode::Low)).await;
        let second = send(&bot, use_heater(WattMode::High)).await;

        assert!(second[0].text.contains("Already tracking Heater"));
    }

    #[tokio::test]
    async fn use_without_mode_offers_mode_buttons_with_current_price() {
        let (bot, _, _) = bot("bot-modes", StubPriceProvider::flat(1.25), oslo(2025, 2, 3, 9, 0));

        send(&bot, add_heater()).await;
        let replies = send(
            &bot,
            Command::Use {
                name: Some("heater".to_string()),
                mode: None,
            },
        )
        .await;

        assert!(replies[0].text.contains("Current spot price (NO1): 1.2500 kr/kWh"));
        let commands: Vec<&Command> = replies[0]
            .buttons
            .iter()
            .flatten()
            .map(|button| &button.command)
            .collect();
        assert!(commands.contains(&&use_heater(WattMode::Average)));
        assert!(commands.contains(&&Command::Dismiss));
    }

    #[tokio::test]
    async fn stop_flags_degraded_prices() {
        let (bot, clock, store) = bot("bot-degraded", FailingPriceProvider, oslo(2025, 2, 3, 9, 0));

        send(&bot, add_heater()).await;
        send(&bot, use_heater(WattMode::Low)).await;
        clock.advance(TimeDelta::hours(2));
        let stopped = send(&bot, Command::Stop).await;

        assert!(stopped[0].text.contains("Spot prices were unavailable"));
        assert!(store.recent_sessions(USER, 1).expect("query")[0].fallback_used);
    }

    #[tokio::test]
    async fn overlong_session_stays_active_and_suggests_cancel() {
        let (bot, clock, store) = bot("bot-overlong", StubPriceProvider::flat(1.0), oslo(2025, 1, 1, 8, 0));

        send(&bot, add_heater()).await;
        send(&bot, use_heater(WattMode::Low)).await;
        clock.advance(TimeDelta::days(40));
        let replies = send(&bot, Command::Stop).await;

        assert!(replies[0].text.contains("/cancel"));
        assert_eq!(replies[0].buttons[0][0].command, Command::Cancel);
        assert!(store.active_session(USER).expect("query").is_some());

        let cancelled = send(&bot, Command::Cancel).await;
        assert!(cancelled[0].text.contains("not recorded"));
        assert!(store.active_session(USER).expect("query").is_none());
        assert!(store.recent_sessions(USER, 10).expect("query").is_empty());
    }

    #[tokio::test]
    async fn stop_reports_budget_alert() {
        let (bot, clock, _) = bot("bot-budget", StubPriceProvider::flat(2.0), oslo(2025, 2, 3, 9, 0));

        send(&bot, Command::Budget { amount: Some(5.0) }).await;
        send(&bot, add_heater()).await;
        send(&bot, use_heater(WattMode::High)).await;
        clock.advance(TimeDelta::hours(1));
        let replies = send(&bot, Command::Stop).await;

        assert_eq!(replies.len(), 2);
        assert!(replies[0].text.contains("Total: 4.50 kr"));
        assert!(replies[0].text.contains("Budget: 0.50 kr remaining of 5.00 kr"));
        assert!(replies[1].text.contains("Budget warning: 90% used"));
    }

    #[tokio::test]
    async fn status_estimates_and_warns_about_long_sessions() {
        let (bot, clock, _) = bot("bot-status", StubPriceProvider::flat(1.0), oslo(2025, 2, 3, 9, 0));

        send(&bot, add_heater()).await;
        send(&bot, use_heater(WattMode::High)).await;
        clock.advance(TimeDelta::minutes(150));
        let replies = send(&bot, Command::Status).await;

        assert!(replies[0].text.contains("Running: 2h 30m"));
        assert!(replies[0].text.contains("Current: 3.750 kWh"));
        assert!(replies[1].text.contains("Long session"));
    }

    #[tokio::test]
    async fn month_summary_follows_billing_period() {
        let (bot, clock, _) = bot("bot-month", StubPriceProvider::flat(1.0), oslo(2025, 3, 14, 10, 0));

        send(&bot, Command::SetPeriod { day: Some(15) }).await;
        send(&bot, add_heater()).await;
        send(&bot, use_heater(WattMode::High)).await;
        clock.advance(TimeDelta::hours(1));
        send(&bot, Command::Stop).await;

        let march = send(&bot, Command::Month { month: None, year: None }).await;
        assert!(march[0].text.contains("March 2025 (current)"));
        assert!(march[0].text.contains("Sessions: 1"));

        let april = send(
            &bot,
            Command::Month {
                month: Some(4),
                year: Some(2025),
            },
        )
        .await;
        assert!(april[0].text.contains("Sessions: 0"));
        assert!(!april[0].text.contains("(current)"));
    }

    #[tokio::test]
    async fn validates_settings_input() {
        let (bot, _, store) = bot("bot-settings", StubPriceProvider::flat(1.0), oslo(2025, 3, 1, 10, 0));

        let negative = send(&bot, Command::SetFixedCost { amount: Some(-1.0) }).await;
        let bad_day = send(&bot, Command::SetPeriod { day: Some(31) }).await;
        send(&bot, Command::SetFixedCost { amount: Some(0.75) }).await;

        assert!(negative[0].text.contains("cannot be negative"));
        assert!(bad_day[0].text.contains("between 1 and 28"));
        let settings = store.user_settings(USER).expect("query");
        assert_eq!(settings.fixed_cost_per_kwh, 0.75);
        assert_eq!(settings.period_start_day, 1);
    }

    #[tokio::test]
    async fn clear_asks_for_confirmation_first() {
        let (bot, clock, store) = bot("bot-clear", StubPriceProvider::flat(1.0), oslo(2025, 3, 1, 10, 0));

        assert!(send(&bot, Command::Clear { confirmed: false }).await[0]
            .text
            .contains("No sessions"));

        send(&bot, add_heater()).await;
        send(&bot, use_heater(WattMode::Low)).await;
        clock.advance(TimeDelta::hours(1));
        send(&bot, Command::Stop).await;

        let confirm = send(&bot, Command::Clear { confirmed: false }).await;
        assert!(confirm[0].text.contains("delete 1 sessions"));
        assert_eq!(
            confirm[0].buttons[0][0].command,
            Command::Clear { confirmed: true }
        );
        assert_eq!(store.recent_sessions(USER, 10).expect("query").len(), 1);

        let cleared = send(&bot, Command::Clear { confirmed: true }).await;
        assert!(cleared[0].text.contains("Cleared 1 sessions"));
        assert!(store.recent_sessions(USER, 10).expect("query").is_empty());
    }

    #[tokio::test]
    async fn delete_without_name_lists_appliances() {
        let (bot, _, _) = bot("bot-delete", StubPriceProvider::flat(1.0), oslo(2025, 3, 1, 10, 0));

        assert!(send(&bot, Command::Delete { name: None }).await[0]
            .text
            .contains("No appliances"));

        send(&bot, add_heater()).await;
        let replies = send(&bot, Command::Delete { name: None }).await;
        assert_eq!(
            replies[0].buttons[0][0].command,
            Command::Delete {
                name: Some("Heater".to_string())
            }
        );

        let deleted = send(
            &bot,
            Command::Delete {
                name: Some("Heater".to_string()),
            },
        )
        .await;
        assert!(deleted[0].text.contains("Heater deleted"));
    }
}
