use thiserror::Error;

use crate::domain::models::{Region, WattMode};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Add {
        name: String,
        low_watts: u32,
        high_watts: u32,
    },
    List,
    Delete {
        name: Option<String>,
    },
    Use {
        name: Option<String>,
        mode: Option<WattMode>,
    },
    Stop,
    Cancel,
    Status,
    Month {
        month: Option<u32>,
        year: Option<i32>,
    },
    History,
    Budget {
        amount: Option<f64>,
    },
    SetFixedCost {
        amount: Option<f64>,
    },
    SetRegion {
        region: Option<Region>,
    },
    SetPeriod {
        day: Option<u32>,
    },
    Config,
    Clear {
        confirmed: bool,
    },
    Dismiss,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("message is not a command")]
    NotACommand,
    #[error("unknown command: /{0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("{field} must be a number, got {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid region {0:?}; choose NO1, NO2, NO3, NO4 or NO5")]
    InvalidRegion(String),
    #[error("month must be 1-12, got {0}")]
    InvalidMonth(u32),
    #[error("unrecognized button payload: {0}")]
    InvalidCallback(String),
}

const ADD_USAGE: &str = "/add [name] [low] [high], e.g. /add Jula 750 1500";
const MONTH_USAGE: &str = "/mnd, /mnd [month] or /mnd [month] [year], e.g. /mnd 12 2025";

pub fn parse_command(text: &str) -> Result<Command, CommandParseError> {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Err(CommandParseError::NotACommand);
    };

    let mut tokens = rest.split_whitespace();
    let head = tokens.next().ok_or(CommandParseError::NotACommand)?;
    let name = head
        .split_once('@')
        .map_or(head, |(command, _bot)| command)
        .to_ascii_lowercase();
    let args: Vec<&str> = tokens.collect();

    match name.as_str() {
        "start" => Ok(Command::Start),
        "help" => Ok(Command::Help),
        "add" => parse_add(&args),
        "list" => Ok(Command::List),
        "delete" => Ok(Command::Delete {
            name: first_owned(&args),
        }),
        "use" => Ok(Command::Use {
            name: first_owned(&args),
            mode: args.get(1).and_then(|raw| raw.parse().ok()),
        }),
        "stop" => Ok(Command::Stop),
        "cancel" => Ok(Command::Cancel),
        "status" => Ok(Command::Status),
        "mnd" => parse_month(&args),
        "history" => Ok(Command::History),
        "budget" => Ok(Command::Budget {
            amount: args
                .first()
                .map(|raw| parse_amount("budget", raw))
                .transpose()?,
        }),
        "set_fastkost" => Ok(Command::SetFixedCost {
            amount: args
                .first()
                .map(|raw| parse_amount("fixed cost", raw))
                .transpose()?,
        }),
        "set_region" => Ok(Command::SetRegion {
            region: args
                .first()
                .map(|raw| {
                    raw.parse::<Region>()
                        .map_err(|_| CommandParseError::InvalidRegion((*raw).to_string()))
                })
                .transpose()?,
        }),
        "set_periode" => Ok(Command::SetPeriod {
            day: args
                .first()
                .map(|raw| parse_whole("day", raw))
                .transpose()?,
        }),
        "config" => Ok(Command::Config),
        "clear" => Ok(Command::Clear { confirmed: false }),
        other => Err(CommandParseError::Unknown(other.to_string())),
    }
}

pub fn parse_callback(data: &str) -> Result<Command, CommandParseError> {
    let invalid = || CommandParseError::InvalidCallback(data.to_string());
    let mut parts = data.splitn(3, ':');
    let kind = parts.next().ok_or_else(invalid)?;
    let action = parts.next().ok_or_else(invalid)?;
    let argument = parts.next();

    match (kind, action, argument) {
        ("watt", "cancel", _) | ("app", "cancel", _) | ("confirm", "cancel", _) => {
            Ok(Command::Dismiss)
        }
        ("watt", mode, Some(name)) if !name.is_empty() => Ok(Command::Use {
            name: Some(name.to_string()),
            mode: Some(mode.parse().map_err(|_| invalid())?),
        }),
        ("app", "use", Some(name)) if !name.is_empty() => Ok(Command::Use {
            name: Some(name.to_string()),
            mode: None,
        }),
        ("app", "delete", Some(name)) if !name.is_empty() => Ok(Command::Delete {
            name: Some(name.to_string()),
        }),
        ("region", code, None) => Ok(Command::SetRegion {
            region: Some(code.parse().map_err(|_| invalid())?),
        }),
        ("confirm", "clear", _) => Ok(Command::Clear { confirmed: true }),
        ("session", "stop", None) => Ok(Command::Stop),
        ("session", "status", None) => Ok(Command::Status),
        ("session", "cancel", None) => Ok(Command::Cancel),
        _ => Err(invalid()),
    }
}

impl Command {
    pub fn to_callback_data(&self) -> Option<String> {
        match self {
            Command::Use {
                name: Some(name),
                mode: Some(mode),
            } => Some(format!("watt:{mode}:{name}")),
            Command::Use {
                name: Some(name),
                mode: None,
            } => Some(format!("app:use:{name}")),
            Command::Delete { name: Some(name) } => Some(format!("app:delete:{name}")),
            Command::SetRegion {
                region: Some(region),
            } => Some(format!("region:{region}")),
            Command::Clear { confirmed: true } => Some("confirm:clear:all".to_string()),
            Command::Stop => Some("session:stop".to_string()),
            Command::Status => Some("session:status".to_string()),
            Command::Cancel => Some("session:cancel".to_string()),
            Command::Dismiss => Some("app:cancel:".to_string()),
            _ => None,
        }
    }
}

fn first_owned(args: &[&str]) -> Option<String> {
    args.first().map(|value| (*value).to_string())
}

fn parse_add(args: &[&str]) -> Result<Command, CommandParseError> {
    let [name, low, high, ..] = args else {
        return Err(CommandParseError::Usage(ADD_USAGE));
    };

    Ok(Command::Add {
        name: (*name).to_string(),
        low_watts: parse_whole("low wattage", low)?,
        high_watts: parse_whole("high wattage", high)?,
    })
}

fn parse_month(args: &[&str]) -> Result<Command, CommandParseError> {
    let month = match args.first() {
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| CommandParseError::Usage(MONTH_USAGE))?,
        ),
        None => None,
    };
    if let Some(month) = month
        && !(1..=12).contains(&month)
    {
        return Err(CommandParseError::InvalidMonth(month));
    }

    let year = match args.get(1) {
        Some(raw) => Some(
            raw.parse::<i32>()
                .map_err(|_| CommandParseError::Usage(MONTH_USAGE))?,
        ),
        None => None,
    };

    Ok(Command::Month { month, year })
}

fn parse_whole(field: &'static str, raw: &str) -> Result<u32, CommandParseError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| CommandParseError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

fn parse_amount(field: &'static str, raw: &str) -> Result<f64, CommandParseError> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| CommandParseError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{Command, CommandParseError, parse_callback, parse_command};
    use crate::domain::models::{Region, WattMode};

    #[test]
    fn parses_add_with_bot_suffix() {
        let command = parse_command("/add@stromtracker_bot Jula 750 1500").expect("should parse");

        assert_eq!(
            command,
            Command::Add {
                name: "Jula".to_string(),
                low_watts: 750,
                high_watts: 1500,
            }
        );
    }

    #[test]
    fn add_requires_three_arguments() {
        assert!(matches!(
            parse_command("/add Jula 750"),
            Err(CommandParseError::Usage(_))
        ));
        assert_eq!(
            parse_command("/add Jula lots 1500"),
            Err(CommandParseError::InvalidNumber {
                field: "low wattage",
                value: "lots".to_string(),
            })
        );
    }

    #[test]
    fn parses_optional_arguments() {
        assert_eq!(
            parse_command("/use Heater high"),
            Ok(Command::Use {
                name: Some("Heater".to_string()),
                mode: Some(WattMode::High),
            })
        );
        assert_eq!(
            parse_command("/use"),
            Ok(Command::Use {
                name: None,
                mode: None,
            })
        );
        assert_eq!(
            parse_command("/mnd 12 2025"),
            Ok(Command::Month {
                month: Some(12),
                year: Some(2025),
            })
        );
        assert_eq!(
            parse_command("/set_region no5"),
            Ok(Command::SetRegion {
                region: Some(Region::No5),
            })
        );
    }

    #[test]
    fn accepts_decimal_comma_amounts() {
        assert_eq!(
            parse_command("/set_fastkost 1,25"),
            Ok(Command::SetFixedCost { amount: Some(1.25) })
        );
        assert_eq!(
            parse_command("/budget 300"),
            Ok(Command::Budget {
                amount: Some(300.0),
            })
        );
    }

    #[test]
    fn rejects_bad_month_and_region() {
        assert_eq!(
            parse_command("/mnd 13"),
            Err(CommandParseError::InvalidMonth(13))
        );
        assert_eq!(
            parse_command("/set_region SE3"),
            Err(CommandParseError::InvalidRegion("SE3".to_string()))
        );
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(
            parse_command("hello there"),
            Err(CommandParseError::NotACommand)
        );
        assert_eq!(
            parse_command("/frobnicate"),
            Err(CommandParseError::Unknown("frobnicate".to_string()))
        );
    }

    #[test]
    fn parses_button_payloads() {
        assert_eq!(
            parse_callback("watt:avg:Panel heater"),
            Ok(Command::Use {
                name: Some("Panel heater".to_string()),
                mode: Some(WattMode::Average),
            })
        );
        assert_eq!(parse_callback("watt:cancel:Heater"), Ok(Command::Dismiss));
        assert_eq!(
            parse_callback("region:NO4"),
            Ok(Command::SetRegion {
                region: Some(Region::No4),
            })
        );
        assert_eq!(
            parse_callback("confirm:clear:all"),
            Ok(Command::Clear { confirmed: true })
        );
        assert_eq!(parse_callback("session:stop"), Ok(Command::Stop));
        assert!(parse_callback("session:explode").is_err());
        assert!(parse_callback("garbage").is_err());
    }

    #[test]
    fn button_commands_round_trip_through_payloads() {
        let commands = [
            Command::Use {
                name: Some("Heater".to_string()),
                mode: Some(WattMode::Low),
            },
            Command::Use {
                name: Some("Heater".to_string()),
                mode: None,
            },
            Command::Delete {
                name: Some("Heater".to_string()),
            },
            Command::SetRegion {
                region: Some(Region::No2),
            },
            Command::Clear { confirmed: true },
            Command::Status,
            Command::Dismiss,
        ];

        for command in commands {
            let data = command
                .to_callback_data()
                .expect("button command should encode");
            assert_eq!(parse_callback(&data), Ok(command));
        }
    }
}
