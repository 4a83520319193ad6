use std::time::Duration;

use chrono::{NaiveDate, Utc};

use stromtracker::adapters::price_api::{
    DEFAULT_PRICE_API_BASE, DailyPriceSource, HvaKosterStrommenClient, UPSTREAM_TIMEZONE,
};
use stromtracker::domain::models::Region;

fn main() {
    if let Err(error) = run() {
        eprintln!("price probe failed: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut regions = Region::ALL.to_vec();
    let mut date = Utc::now().with_timezone(&UPSTREAM_TIMEZONE).date_naive();
    let mut base_url = std::env::var("PRICE_API_BASE")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PRICE_API_BASE.to_string());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        let value = args.get(index + 1);
        match (args[index].as_str(), value) {
            ("--region", Some(value)) => {
                let region = value.parse::<Region>().map_err(|error| error.to_string())?;
                regions = vec![region];
                index += 2;
            }
            ("--date", Some(value)) => {
                date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map_err(|error| format!("--date expects YYYY-MM-DD: {error}"))?;
                index += 2;
            }
            ("--base-url", Some(value)) => {
                base_url = value.clone();
                index += 2;
            }
            ("--help" | "-h", _) => {
                print_help();
                return Ok(());
            }
            (flag @ ("--region" | "--date" | "--base-url"), None) => {
                return Err(format!("{flag} requires a value"));
            }
            (other, _) => return Err(format!("unknown argument: {other}")),
        }
    }

    let client = HvaKosterStrommenClient::new(&base_url, Duration::from_secs(10))
        .map_err(|error| error.to_string())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| error.to_string())?;

    runtime.block_on(async {
        for region in regions {
            println!("{} ({}) {date}", region.code(), region.display_name());
            match client.fetch_day(region, date).await {
                Ok(intervals) => {
                    for interval in intervals {
                        println!(
                            "  {} - {}  {:.4} NOK/kWh",
                            interval.starts_at.with_timezone(&UPSTREAM_TIMEZONE).format("%H:%M"),
                            interval.ends_at.with_timezone(&UPSTREAM_TIMEZONE).format("%H:%M"),
                            interval.price_per_kwh
                        );
                    }
                }
                Err(error) => println!("  unavailable: {error}"),
            }
        }
    });

    Ok(())
}

fn print_help() {
    println!("price_probe");
    println!();
    println!("Usage:");
    println!("  price_probe [--region NO1..NO5] [--date YYYY-MM-DD] [--base-url <url>]");
    println!();
    println!("Prints VAT-adjusted spot prices per interval for one or all regions.");
}
