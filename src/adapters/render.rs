use std::fmt::Write as _;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::adapters::db::SessionTotals;
use crate::domain::alerts::{BudgetAlert, SessionAlert};
use crate::domain::command::CommandParseError;
use crate::domain::models::{
    ActiveSession, Appliance, CompletedSession, Region, UserSettings, ValidationError,
};
use crate::domain::pricing::{FALLBACK_PRICE_PER_KWH, PricePoint};
use crate::domain::session_cost::{CostBreakdown, CostError};
use crate::domain::summary::MonthlySummary;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const PRICE_SOURCE: &str = "Prices from hvakosterstrommen.no";

const MAX_LISTED_HOURS: usize = 24;

pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|index| MONTH_NAMES.get(index as usize))
        .copied()
        .unwrap_or("?")
}

pub fn format_duration(duration: TimeDelta) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    match (hours, minutes) {
        (0, minutes) => format!("{minutes}m"),
        (hours, 0) => format!("{hours}h"),
        (hours, minutes) => format!("{hours}h {minutes}m"),
    }
}

fn local_time(instant: DateTime<Utc>, timezone: Tz, pattern: &str) -> String {
    instant.with_timezone(&timezone).format(pattern).to_string()
}

fn price_text(price: Option<&PricePoint>) -> String {
    match price {
        Some(price) if price.valid => format!("{:.4} kr/kWh", price.price_per_kwh),
        _ => "unavailable".to_string(),
    }
}

pub fn welcome() -> String {
    format!(
        "👋 Welcome to Strømtracker!\n\n\
         Track your appliance energy usage and costs with Norwegian spot prices.\n\n\
         Quick start:\n\
         1️⃣ /add Heater 750 1500 - add an appliance\n\
         2️⃣ /use Heater - start tracking\n\
         3️⃣ /stop - end the session and see the cost\n\n\
         Settings:\n\
         • /set_fastkost 1 - fixed cost per kWh\n\
         • /set_region NO1 - price region\n\
         • /budget 200 - monthly budget\n\n\
         Type /help for all commands.\n\n{PRICE_SOURCE}"
    )
}

pub fn help() -> String {
    "📖 Strømtracker help\n\n\
     Appliances:\n\
     • /add [name] [low] [high] - add appliance\n\
     • /list - show all appliances\n\
     • /delete [name] - remove appliance\n\n\
     Tracking:\n\
     • /use [name] - start tracking\n\
     • /stop - end session, show costs\n\
     • /cancel - cancel without recording\n\
     • /status - current runtime and estimate\n\n\
     Reports:\n\
     • /mnd [month] [year] - billing period summary\n\
     • /history - recent sessions\n\n\
     Settings:\n\
     • /set_fastkost [kr] - fixed cost per kWh\n\
     • /set_region [NO1-NO5] - price region\n\
     • /budget [kr] - monthly budget (0 disables)\n\
     • /set_periode [day] - billing start day (1-28)\n\
     • /config - show all settings\n\
     • /clear - delete session history\n\n\
     Cost formula:\n\
     kWh = hours × (watts / 1000), split per clock hour\n\
     Spot = kWh × spot price (+ 25% MVA, except NO4)\n\
     Fixed = kWh × fastkost\n\
     Total = Spot + Fixed"
        .to_string()
}

pub fn parse_error(error: &CommandParseError) -> String {
    match error {
        CommandParseError::Unknown(name) => {
            format!("❓ Unknown command /{name}.\n\nType /help for all commands.")
        }
        CommandParseError::NotACommand => "Type /help to see what I can do.".to_string(),
        other => format!("❌ {other}"),
    }
}

pub fn validation_error(error: &ValidationError) -> String {
    format!("❌ {}", capitalize(&error.to_string()))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn generic_failure() -> String {
    "⚠️ Something went wrong on our side. Please try again in a moment.".to_string()
}

pub fn dismissed() -> String {
    "❌ Cancelled.".to_string()
}

// Appliances

pub fn appliance_added(appliance: &Appliance) -> String {
    format!(
        "✅ {name} added!\n\n🔋 Low: {low}W\n⚡ High: {high}W\n📊 Avg: {avg}W\n\nUse /use {name} to start tracking.",
        name = appliance.name,
        low = appliance.low_watts,
        high = appliance.high_watts,
        avg = appliance.average_watts(),
    )
}

pub fn appliance_exists(name: &str) -> String {
    format!("❌ Appliance {name} already exists.")
}

pub fn appliance_not_found(name: &str) -> String {
    format!("❌ Appliance {name} not found.\n\nUse /list to see your appliances.")
}

pub fn appliance_deleted(name: &str) -> String {
    format!("🗑️ {name} deleted.")
}

pub fn no_appliances() -> String {
    "📋 No appliances registered.\n\nAdd one with /add [name] [low] [high]".to_string()
}

pub fn appliance_list(appliances: &[Appliance]) -> String {
    if appliances.is_empty() {
        return no_appliances();
    }

    let mut text = String::from("📋 Your appliances:\n");
    for appliance in appliances {
        let _ = write!(
            text,
            "\n• {}: {}W / {}W (avg {}W)",
            appliance.name,
            appliance.low_watts,
            appliance.high_watts,
            appliance.average_watts()
        );
    }
    text
}

pub fn select_appliance_to_use() -> String {
    "⚡ Select appliance to track:".to_string()
}

pub fn select_appliance_to_delete() -> String {
    "🗑️ Select appliance to delete:".to_string()
}

pub fn watt_mode_prompt(
    appliance: &Appliance,
    settings: &UserSettings,
    current_price: Option<&PricePoint>,
) -> String {
    format!(
        "⚡ Start tracking: {name}\n\n\
         Select power mode:\n\
         🔋 Low: {low}W\n\
         ⚡ High: {high}W\n\
         📊 Avg: {avg}W\n\n\
         Current spot price ({region}): {price}\n\
         Fixed cost: {fixed:.2} kr/kWh",
        name = appliance.name,
        low = appliance.low_watts,
        high = appliance.high_watts,
        avg = appliance.average_watts(),
        region = settings.region,
        price = price_text(current_price),
        fixed = settings.fixed_cost_per_kwh,
    )
}

// Sessions

pub fn session_started(session: &ActiveSession, timezone: Tz, current_price: &PricePoint) -> String {
    format!(
        "✅ Session started!\n\n\
         📟 {name} @ {watts}W ({emoji} {mode})\n\
         ⏱ Started: {started}\n\
         💡 Spot price ({region}): {price}",
        name = session.appliance_name,
        watts = session.watts,
        emoji = session.watt_mode.emoji(),
        mode = session.watt_mode,
        started = local_time(session.started_at, timezone, "%H:%M"),
        region = session.region,
        price = price_text(Some(current_price)),
    )
}

pub fn already_tracking(session: &ActiveSession) -> String {
    format!(
        "⚠️ Already tracking {}.\n\nUse /stop to end or /cancel to abort.",
        session.appliance_name
    )
}

pub fn no_active_session() -> String {
    "❌ No active session.\n\nStart one with /use [appliance]".to_string()
}

pub fn degraded_warning() -> String {
    format!(
        "⚠️ Spot prices were unavailable for part of this session; {FALLBACK_PRICE_PER_KWH:.2} kr/kWh was used for those hours."
    )
}

fn budget_line(summary: &MonthlySummary) -> Option<String> {
    let budget = summary.budget?;
    let remaining = summary.remaining_budget()?;
    Some(format!(
        "💼 Budget: {remaining:.2} kr remaining of {budget:.2} kr"
    ))
}

pub fn session_stopped(
    session: &ActiveSession,
    breakdown: &CostBreakdown,
    summary: &MonthlySummary,
) -> String {
    let mut text = format!(
        "✅ Session ended: {name}\n\n\
         ⏱ Duration: {duration} ({emoji} {mode})\n\
         ⚡ Consumption: {kwh:.2} kWh @ {watts}W\n\n\
         💰 Cost breakdown:\n   \
         Spot ({region}): {spot_price:.2} kr/kWh → {spot:.2} kr\n   \
         Fixed: {fixed_price:.2} kr/kWh → {fixed:.2} kr\n   \
         ─────────────────────\n   \
         Total: {total:.2} kr",
        name = session.appliance_name,
        duration = format_duration(breakdown.duration),
        emoji = session.watt_mode.emoji(),
        mode = session.watt_mode,
        kwh = breakdown.kwh,
        watts = breakdown.watts,
        region = breakdown.region,
        spot_price = breakdown.average_spot_price().unwrap_or(0.0),
        spot = breakdown.spot_cost,
        fixed_price = breakdown.fixed_cost_per_kwh,
        fixed = breakdown.fixed_cost,
        total = breakdown.total_cost,
    );

    if breakdown.hours.len() > 1 {
        text.push_str("\n\n🕐 Per hour:");
        text.push_str(&hourly_lines(breakdown));
    }

    let _ = write!(
        text,
        "\n\n📊 {month} total: {month_kwh:.2} kWh / {month_cost:.2} kr ({sessions} sessions)",
        month = month_name(summary.month),
        month_kwh = summary.total_kwh,
        month_cost = summary.total_cost,
        sessions = summary.session_count,
    );

    if let Some(line) = budget_line(summary) {
        text.push('\n');
        text.push_str(&line);
    }
    if breakdown.fallback_used {
        text.push_str("\n\n");
        text.push_str(&degraded_warning());
    }

    text
}

fn hourly_lines(breakdown: &CostBreakdown) -> String {
    let mut lines = String::new();
    for hour in breakdown.hours.iter().take(MAX_LISTED_HOURS) {
        let _ = write!(
            lines,
            "\n   {time}  {kwh:.3} kWh × {price:.2} → {cost:.2} kr{marker}",
            time = hour.hour.format("%d/%m %H:%M"),
            kwh = hour.kwh,
            price = hour.price.price_per_kwh,
            cost = hour.total_cost(),
            marker = if hour.price.valid { "" } else { " ⚠️" },
        );
    }

    let hidden = breakdown.hours.len().saturating_sub(MAX_LISTED_HOURS);
    if hidden > 0 {
        let _ = write!(lines, "\n   … and {hidden} more hours");
    }
    lines
}

pub fn stop_failed(error: &CostError) -> String {
    format!(
        "❌ Could not calculate this session: {error}.\n\nThe session is still active. Use /cancel to discard it."
    )
}

pub fn session_cancelled(session: &ActiveSession, elapsed: TimeDelta) -> String {
    format!(
        "🚫 Session cancelled\n\n{} ({}) - not recorded.",
        session.appliance_name,
        format_duration(elapsed)
    )
}

pub fn no_session_to_cancel() -> String {
    "❌ No active session to cancel.".to_string()
}

pub fn session_status(session: &ActiveSession, estimate: &CostBreakdown) -> String {
    let mut text = format!(
        "📊 Active session\n\n\
         📟 {name} @ {watts}W ({emoji})\n\
         ⏱ Running: {duration}\n\
         ⚡ Current: {kwh:.3} kWh\n\n\
         💰 Estimated cost so far:\n   \
         Spot ({region}): {spot:.2} kr\n   \
         Fixed: {fixed:.2} kr\n   \
         Total: {total:.2} kr",
        name = session.appliance_name,
        watts = session.watts,
        emoji = session.watt_mode.emoji(),
        duration = format_duration(estimate.duration),
        kwh = estimate.kwh,
        region = session.region,
        spot = estimate.spot_cost,
        fixed = estimate.fixed_cost,
        total = estimate.total_cost,
    );

    if estimate.fallback_used {
        text.push_str("\n\n");
        text.push_str(&degraded_warning());
    }
    text.push_str("\n\nUse /stop to end or /cancel to abort.");
    text
}

pub fn status_unavailable(session: &ActiveSession, error: &CostError) -> String {
    format!(
        "📊 Active session: {}\n\n⚠️ No estimate available: {error}.\n\nUse /cancel to discard it.",
        session.appliance_name
    )
}

// Reports

pub fn month_summary(summary: &MonthlySummary, region: Region, is_current: bool) -> String {
    let current = if is_current { " (current)" } else { "" };
    let mut text = format!(
        "📅 {month} {year}{current} ({region} - {region_name})\n\
         🗓 {from} – {to}\n\n\
         📊 Sessions: {sessions}\n\
         ⚡ Usage: {kwh:.2} kWh\n\
         💰 Total: {total:.2} kr\n   \
         • Spot: {spot:.2} kr\n   \
         • Fixed: {fixed:.2} kr\n\
         📈 Average: {average:.2} kr/kWh",
        month = month_name(summary.month),
        year = summary.year,
        region_name = region.display_name(),
        from = summary.period.start.format("%d.%m.%Y"),
        to = summary.period.end.pred_opt().unwrap_or(summary.period.end).format("%d.%m.%Y"),
        sessions = summary.session_count,
        kwh = summary.total_kwh,
        total = summary.total_cost,
        spot = summary.spot_cost,
        fixed = summary.fixed_cost,
        average = summary.average_price_per_kwh(),
    );

    if is_current
        && let (Some(budget), Some(remaining), Some(used)) = (
            summary.budget,
            summary.remaining_budget(),
            summary.budget_used_percent(),
        )
    {
        let _ = write!(
            text,
            "\n\n💼 Budget: {remaining:.2} kr remaining of {budget:.2} kr ({used:.0}% used)"
        );
    }

    let _ = write!(text, "\n\n{PRICE_SOURCE}");
    text
}

pub fn invalid_period(month: u32, year: i32) -> String {
    format!("❌ No billing period for {month}/{year}.")
}

pub fn history(sessions: &[CompletedSession], timezone: Tz) -> String {
    if sessions.is_empty() {
        return "📜 No session history yet.\n\nStart tracking with /use [appliance]".to_string();
    }

    let mut text = String::from("📜 Recent sessions:\n");
    for session in sessions {
        let _ = write!(
            text,
            "\n• {} - {}: {:.2} kWh, {:.2} kr{}",
            local_time(session.finished_at, timezone, "%d/%m %H:%M"),
            session.appliance_name,
            session.kwh,
            session.total_cost,
            if session.fallback_used { " ⚠️" } else { "" }
        );
    }
    text
}

// Alerts

pub fn budget_alert(alert: &BudgetAlert) -> String {
    match alert {
        BudgetAlert::Exceeded {
            used_percent,
            spent,
            budget,
        } => format!("⚠️ Budget exceeded! {spent:.2} kr / {budget:.2} kr ({used_percent:.0}%)"),
        BudgetAlert::Warning {
            used_percent,
            remaining,
        } => format!(
            "⚠️ Budget warning: {used_percent:.0}% used. {remaining:.2} kr remaining."
        ),
    }
}

pub fn session_alert(alert: &SessionAlert, appliance_name: &str) -> String {
    match alert {
        SessionAlert::LongRunning { elapsed } => format!(
            "⏰ Long session: {appliance_name} has been running for {}. Use /stop when done or /cancel to abort.",
            format_duration(*elapsed)
        ),
        SessionAlert::MaxDurationReached {
            elapsed,
            limit_hours,
        } => format!(
            "🛑 Max duration reached: {appliance_name} has been running for {} (limit: {limit_hours}h). The session should be stopped.",
            format_duration(*elapsed)
        ),
    }
}

// Settings

pub fn budget_status(summary: &MonthlySummary) -> String {
    match (summary.budget, summary.remaining_budget()) {
        (Some(budget), Some(remaining)) => format!(
            "💼 Budget: {budget:.2} kr\n\nRemaining: {remaining:.2} kr\n\nSet a new budget: /budget [kr]"
        ),
        _ => "💼 No budget set.\n\nSet one: /budget [kr]".to_string(),
    }
}

pub fn budget_set(settings: &UserSettings) -> String {
    match settings.monthly_budget {
        Some(budget) => format!("✅ Budget set to {budget:.2} kr per month."),
        None => "💼 Budget disabled.".to_string(),
    }
}

pub fn fixed_cost_status(settings: &UserSettings) -> String {
    format!(
        "⚙️ Fixed cost: {:.2} kr/kWh\n\n(Includes nettleie, avgifter, MVA)\n\nChange: /set_fastkost [kr]",
        settings.fixed_cost_per_kwh
    )
}

pub fn fixed_cost_set(settings: &UserSettings) -> String {
    format!(
        "✅ Fixed cost set to {:.2} kr/kWh\n\n⚠️ Adjust this to your electricity bill (nettleie + avgifter + MVA)",
        settings.fixed_cost_per_kwh
    )
}

pub fn region_prompt(settings: &UserSettings) -> String {
    format!(
        "🗺️ Current region: {} ({})\n\nChange region:",
        settings.region,
        settings.region.display_name()
    )
}

pub fn region_set(region: Region) -> String {
    format!("✅ Region set to {region} ({})", region.display_name())
}

pub fn period_status(settings: &UserSettings) -> String {
    format!(
        "📆 Billing period starts on day {} of each month.\n\nChange: /set_periode [day] (1-28)",
        settings.period_start_day
    )
}

pub fn period_set(settings: &UserSettings) -> String {
    format!(
        "✅ Billing period now starts on day {} of each month.",
        settings.period_start_day
    )
}

pub fn config(settings: &UserSettings, appliances: &[Appliance]) -> String {
    let budget = settings
        .monthly_budget
        .map_or_else(|| "Not set".to_string(), |budget| format!("{budget:.2} kr/month"));
    let max_duration = if settings.max_duration_hours > 0 {
        format!("after {}h", settings.max_duration_hours)
    } else {
        "disabled".to_string()
    };

    let mut text = format!(
        "⚙️ Your configuration\n\n\
         Region: {region} ({region_name})\n\
         Fixed cost: {fixed:.2} kr/kWh\n\
         Budget: {budget}\n\
         Billing period: day {day} of each month\n\
         Max duration alert: {max_duration}\n\n\
         Appliances: {count} registered",
        region = settings.region,
        region_name = settings.region.display_name(),
        fixed = settings.fixed_cost_per_kwh,
        day = settings.period_start_day,
        count = appliances.len(),
    );

    if !appliances.is_empty() {
        text.push('\n');
        for appliance in appliances {
            let _ = write!(
                text,
                "\n• {} ({}W / {}W)",
                appliance.name, appliance.low_watts, appliance.high_watts
            );
        }
    }

    text.push_str("\n\nUse /help to see how to change settings");
    text
}

pub fn clear_confirmation(totals: &SessionTotals) -> String {
    format!(
        "⚠️ Clear all session history?\n\n\
         This will delete {} sessions:\n\
         • {:.2} kWh total\n\
         • {:.2} kr total\n\n\
         This cannot be undone!",
        totals.count, totals.kwh, totals.total_cost
    )
}

pub fn nothing_to_clear() -> String {
    "🗑️ No sessions to clear.".to_string()
}

pub fn cleared(deleted: usize) -> String {
    format!("✅ Cleared {deleted} sessions.\n\nStarting fresh!")
}
