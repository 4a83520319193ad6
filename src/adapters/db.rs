use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use thiserror::Error;

use crate::domain::models::{
    ActiveSession, Appliance, CompletedSession, NewAppliance, NewSession, Region,
    SessionCompletion, UserId, UserSettings, WattMode,
};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS appliances (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL COLLATE NOCASE,
    low_watts INTEGER NOT NULL,
    high_watts INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, name)
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    appliance_id TEXT,
    appliance_name TEXT NOT NULL,
    watt_mode TEXT NOT NULL,
    watts INTEGER NOT NULL,
    region TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    kwh REAL,
    spot_cost REAL,
    fixed_cost REAL,
    total_cost REAL,
    fallback_used INTEGER NOT NULL DEFAULT 0,
    cancelled INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active_per_user
ON sessions (user_id) WHERE finished_at IS NULL AND cancelled = 0;

CREATE INDEX IF NOT EXISTS idx_sessions_user_finished_at
ON sessions (user_id, finished_at DESC);

CREATE TABLE IF NOT EXISTS user_settings (
    user_id INTEGER PRIMARY KEY,
    fixed_cost_per_kwh REAL NOT NULL DEFAULT 1.0,
    region TEXT NOT NULL DEFAULT 'NO1',
    monthly_budget REAL,
    period_start_day INTEGER NOT NULL DEFAULT 1,
    max_duration_hours INTEGER NOT NULL DEFAULT 0
);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("user {0} already has an active session")]
    SessionAlreadyActive(UserId),
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    let connection = Connection::open(path)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(connection)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

impl ToSql for Region {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Region {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

impl ToSql for WattMode {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for WattMode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

pub fn timestamp_to_iso8601(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    parse_timestamp(&raw, index)
}

fn parse_timestamp(raw: &str, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })
}

// Settings

pub fn get_user_settings(
    connection: &Connection,
    user_id: UserId,
) -> Result<Option<UserSettings>, DbError> {
    let settings = connection
        .query_row(
            "SELECT fixed_cost_per_kwh, region, monthly_budget, period_start_day, max_duration_hours
             FROM user_settings
             WHERE user_id = ?1",
            params![user_id.0],
            |row| {
                Ok(UserSettings {
                    fixed_cost_per_kwh: row.get(0)?,
                    region: row.get(1)?,
                    monthly_budget: row.get(2)?,
                    period_start_day: row.get(3)?,
                    max_duration_hours: row.get(4)?,
                })
            },
        )
        .optional()?;

    Ok(settings)
}

pub fn upsert_user_settings(
    connection: &Connection,
    user_id: UserId,
    settings: &UserSettings,
) -> Result<(), DbError> {
    connection.execute(
        "INSERT INTO user_settings (user_id, fixed_cost_per_kwh, region, monthly_budget, period_start_day, max_duration_hours)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (user_id) DO UPDATE SET
             fixed_cost_per_kwh = excluded.fixed_cost_per_kwh,
             region = excluded.region,
             monthly_budget = excluded.monthly_budget,
             period_start_day = excluded.period_start_day,
             max_duration_hours = excluded.max_duration_hours",
        params![
            user_id.0,
            settings.fixed_cost_per_kwh,
            settings.region,
            settings.monthly_budget,
            settings.period_start_day,
            settings.max_duration_hours,
        ],
    )?;

    Ok(())
}

// Appliances

const APPLIANCE_COLUMNS: &str = "id, user_id, name, low_watts, high_watts, created_at";

fn appliance_from_row(row: &Row<'_>) -> rusqlite::Result<Appliance> {
    Ok(Appliance {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        name: row.get(2)?,
        low_watts: row.get(3)?,
        high_watts: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

pub fn insert_appliance(
    connection: &Connection,
    user_id: UserId,
    appliance: &NewAppliance,
    created_at: DateTime<Utc>,
) -> Result<Option<Appliance>, DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    let result = connection.execute(
        "INSERT INTO appliances (id, user_id, name, low_watts, high_watts, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            user_id.0,
            appliance.name,
            appliance.low_watts,
            appliance.high_watts,
            timestamp_to_iso8601(created_at),
        ],
    );

    match result {
        Ok(_) => Ok(Some(Appliance {
            id,
            user_id,
            name: appliance.name.clone(),
            low_watts: appliance.low_watts,
            high_watts: appliance.high_watts,
            created_at,
        })),
        Err(rusqlite::Error::SqliteFailure(error, _))
            if error.code == ErrorCode::ConstraintViolation =>
        {
            Ok(None)
        }
        Err(error) => Err(DbError::from(error)),
    }
}

pub fn get_appliance_by_name(
    connection: &Connection,
    user_id: UserId,
    name: &str,
) -> Result<Option<Appliance>, DbError> {
    let appliance = connection
        .query_row(
            &format!("SELECT {APPLIANCE_COLUMNS} FROM appliances WHERE user_id = ?1 AND name = ?2"),
            params![user_id.0, name.trim()],
            appliance_from_row,
        )
        .optional()?;

    Ok(appliance)
}

pub fn list_appliances(connection: &Connection, user_id: UserId) -> Result<Vec<Appliance>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {APPLIANCE_COLUMNS} FROM appliances WHERE user_id = ?1 ORDER BY name"
    ))?;

    let rows = statement.query_map(params![user_id.0], appliance_from_row)?;

    let mut appliances = Vec::new();
    for row in rows {
        appliances.push(row?);
    }

    Ok(appliances)
}

pub fn delete_appliance(connection: &Connection, user_id: UserId, name: &str) -> Result<bool, DbError> {
    let deleted = connection.execute(
        "DELETE FROM appliances WHERE user_id = ?1 AND name = ?2",
        params![user_id.0, name.trim()],
    )?;

    Ok(deleted > 0)
}

// Sessions

pub fn insert_session(connection: &Connection, new_session: &NewSession) -> Result<ActiveSession, DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    let result = connection.execute(
        "INSERT INTO sessions (id, user_id, appliance_id, appliance_name, watt_mode, watts, region, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            new_session.user_id.0,
            new_session.appliance_id,
            new_session.appliance_name,
            new_session.watt_mode,
            new_session.watts,
            new_session.region,
            timestamp_to_iso8601(new_session.started_at),
        ],
    );

    match result {
        Ok(_) => Ok(ActiveSession {
            id,
            user_id: new_session.user_id,
            appliance_id: Some(new_session.appliance_id.clone()),
            appliance_name: new_session.appliance_name.clone(),
            watt_mode: new_session.watt_mode,
            watts: new_session.watts,
            region: new_session.region,
            started_at: new_session.started_at,
        }),
        Err(rusqlite::Error::SqliteFailure(error, _))
            if error.code == ErrorCode::ConstraintViolation =>
        {
            Err(DbError::SessionAlreadyActive(new_session.user_id))
        }
        Err(error) => Err(DbError::from(error)),
    }
}

pub fn get_active_session(
    connection: &Connection,
    user_id: UserId,
) -> Result<Option<ActiveSession>, DbError> {
    let session = connection
        .query_row(
            "SELECT id, user_id, appliance_id, appliance_name, watt_mode, watts, region, started_at
             FROM sessions
             WHERE user_id = ?1 AND finished_at IS NULL AND cancelled = 0",
            params![user_id.0],
            |row| {
                Ok(ActiveSession {
                    id: row.get(0)?,
                    user_id: UserId(row.get(1)?),
                    appliance_id: row.get(2)?,
                    appliance_name: row.get(3)?,
                    watt_mode: row.get(4)?,
                    watts: row.get(5)?,
                    region: row.get(6)?,
                    started_at: timestamp_column(row, 7)?,
                })
            },
        )
        .optional()?;

    Ok(session)
}

pub fn finish_session(
    connection: &Connection,
    session_id: &str,
    completion: &SessionCompletion,
) -> Result<bool, DbError> {
    let updated = connection.execute(
        "UPDATE sessions
         SET finished_at = ?2, kwh = ?3, spot_cost = ?4, fixed_cost = ?5, total_cost = ?6, fallback_used = ?7
         WHERE id = ?1 AND finished_at IS NULL AND cancelled = 0",
        params![
            session_id,
            timestamp_to_iso8601(completion.finished_at),
            completion.kwh,
            completion.spot_cost,
            completion.fixed_cost,
            completion.total_cost,
            completion.fallback_used,
        ],
    )?;

    Ok(updated > 0)
}

pub fn cancel_session(
    connection: &Connection,
    session_id: &str,
    cancelled_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let updated = connection.execute(
        "UPDATE sessions
         SET cancelled = 1, finished_at = ?2
         WHERE id = ?1 AND finished_at IS NULL AND cancelled = 0",
        params![session_id, timestamp_to_iso8601(cancelled_at)],
    )?;

    Ok(updated > 0)
}

const COMPLETED_COLUMNS: &str = "id, appliance_name, watt_mode, watts, region, started_at, finished_at, kwh, spot_cost, fixed_cost, total_cost, fallback_used";

fn completed_from_row(row: &Row<'_>) -> rusqlite::Result<CompletedSession> {
    Ok(CompletedSession {
        id: row.get(0)?,
        appliance_name: row.get(1)?,
        watt_mode: row.get(2)?,
        watts: row.get(3)?,
        region: row.get(4)?,
        started_at: timestamp_column(row, 5)?,
        finished_at: timestamp_column(row, 6)?,
        kwh: row.get(7)?,
        spot_cost: row.get(8)?,
        fixed_cost: row.get(9)?,
        total_cost: row.get(10)?,
        fallback_used: row.get(11)?,
    })
}

pub fn list_completed_sessions(
    connection: &Connection,
    user_id: UserId,
    limit: u32,
) -> Result<Vec<CompletedSession>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {COMPLETED_COLUMNS}
         FROM sessions
         WHERE user_id = ?1 AND finished_at IS NOT NULL AND cancelled = 0
         ORDER BY finished_at DESC
         LIMIT ?2"
    ))?;

    let rows = statement.query_map(params![user_id.0, i64::from(limit)], completed_from_row)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }

    Ok(sessions)
}

pub fn list_completed_sessions_between(
    connection: &Connection,
    user_id: UserId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<CompletedSession>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {COMPLETED_COLUMNS}
         FROM sessions
         WHERE user_id = ?1 AND finished_at IS NOT NULL AND cancelled = 0
           AND finished_at >= ?2 AND finished_at < ?3
         ORDER BY finished_at DESC"
    ))?;

    let rows = statement.query_map(
        params![
            user_id.0,
            timestamp_to_iso8601(from),
            timestamp_to_iso8601(to)
        ],
        completed_from_row,
    )?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }

    Ok(sessions)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionTotals {
    pub count: i64,
    pub kwh: f64,
    pub total_cost: f64,
}

pub fn completed_session_totals(connection: &Connection, user_id: UserId) -> Result<SessionTotals, DbError> {
    let totals = connection.query_row(
        "SELECT COUNT(*), COALESCE(SUM(kwh), 0.0), COALESCE(SUM(total_cost), 0.0)
         FROM sessions
         WHERE user_id = ?1 AND finished_at IS NOT NULL AND cancelled = 0",
        params![user_id.0],
        |row| {
            Ok(SessionTotals {
                count: row.get(0)?,
                kwh: row.get(1)?,
                total_cost: row.get(2)?,
            })
        },
    )?;

    Ok(totals)
}

// The active session is kept.
pub fn clear_sessions(connection: &Connection, user_id: UserId) -> Result<usize, DbError> {
    let deleted = connection.execute(
        "DELETE FROM sessions WHERE user_id = ?1 AND (finished_at IS NOT NULL OR cancelled = 1)",
        params![user_id.0],
    )?;

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::{
        DbError, LATEST_SCHEMA_VERSION, SessionTotals, cancel_session, clear_sessions,
        completed_session_totals, delete_appliance,
        finish_session, get_active_session, get_appliance_by_name, get_user_settings,
        insert_appliance, insert_session, list_appliances, list_completed_sessions,
        list_completed_sessions_between, open_connection, run_migrations, schema_version,
        upsert_user_settings,
    };
    use crate::domain::models::{
        NewAppliance, NewSession, Region, SessionCompletion, UserId, UserSettings, WattMode,
    };
    use crate::test_support::{open_test_connection, temp_db_path};

    const USER: UserId = UserId(42);

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 20, hour, minute, 0).unwrap()
    }

    fn new_session(started_at: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id: USER,
            appliance_id: "appliance-1".to_string(),
            appliance_name: "Heater".to_string(),
            watt_mode: WattMode::Average,
            watts: 1125,
            region: Region::No5,
            started_at,
        }
    }

    fn completion(finished_at: DateTime<Utc>, total_cost: f64) -> SessionCompletion {
        SessionCompletion {
            finished_at,
            kwh: 2.25,
            spot_cost: total_cost - 2.25,
            fixed_cost: 2.25,
            total_cost,
            fallback_used: false,
        }
    }

    #[test]
    fn migrates_fresh_database_to_latest_version() {
        let db_path = temp_db_path("fresh.sqlite");
        let mut connection =
            open_connection(db_path.to_string_lossy().as_ref()).expect("db connection should open");

        run_migrations(&mut connection).expect("migrations should succeed");

        let version = schema_version(&connection).expect("schema version should be queryable");
        assert_eq!(version, LATEST_SCHEMA_VERSION);

        let table_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('appliances', 'sessions', 'user_settings')",
                [],
                |row| row.get(0),
            )
            .expect("table check should work");
        assert_eq!(table_count, 3);
    }

    #[test]
    fn migrations_are_idempotent() {
        let db_path = temp_db_path("idempotent.sqlite");
        let mut connection =
            open_connection(db_path.to_string_lossy().as_ref()).expect("db connection should open");

        run_migrations(&mut connection).expect("first migration run should succeed");
        run_migrations(&mut connection).expect("second migration run should succeed");

        let version = schema_version(&connection).expect("schema version should be queryable");
        assert_eq!(version, LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn settings_default_to_none_and_round_trip() {
        let connection = open_test_connection("settings");

        assert_eq!(get_user_settings(&connection, USER).expect("query"), None);

        let settings = UserSettings {
            fixed_cost_per_kwh: 0.85,
            region: Region::No4,
            monthly_budget: Some(300.0),
            period_start_day: 15,
            max_duration_hours: 6,
        };
        upsert_user_settings(&connection, USER, &settings).expect("insert should succeed");
        upsert_user_settings(&connection, USER, &settings.clone().with_budget(0.0))
            .expect("update should succeed");

        let stored = get_user_settings(&connection, USER)
            .expect("query")
            .expect("settings should exist");
        assert_eq!(stored.region, Region::No4);
        assert_eq!(stored.monthly_budget, None);
        assert_eq!(stored.period_start_day, 15);
    }

    #[test]
    fn appliance_names_are_unique_per_user_ignoring_case() {
        let connection = open_test_connection("appliances");
        let heater = NewAppliance::new("Heater", 750, 1500).expect("valid");

        let inserted = insert_appliance(&connection, USER, &heater, at(8, 0))
            .expect("insert should succeed");
        assert!(inserted.is_some());

        let duplicate = NewAppliance::new("HEATER", 100, 200).expect("valid");
        assert_eq!(
            insert_appliance(&connection, USER, &duplicate, at(8, 1)).expect("insert"),
            None
        );
        assert!(
            insert_appliance(&connection, UserId(7), &duplicate, at(8, 1))
                .expect("insert")
                .is_some()
        );

        let found = get_appliance_by_name(&connection, USER, "heater")
            .expect("query")
            .expect("appliance should exist");
        assert_eq!(found.name, "Heater");
        assert_eq!(found.created_at, at(8, 0));

        assert_eq!(list_appliances(&connection, USER).expect("query").len(), 1);
        assert!(delete_appliance(&connection, USER, "hEaTeR").expect("delete"));
        assert!(!delete_appliance(&connection, USER, "heater").expect("delete"));
    }

    #[test]
    fn allows_only_one_active_session_per_user() {
        let connection = open_test_connection("one-active");

        insert_session(&connection, &new_session(at(9, 0))).expect("first start");
        let second = insert_session(&connection, &new_session(at(9, 5)));

        assert!(matches!(second, Err(DbError::SessionAlreadyActive(USER))));
    }

    #[test]
    fn finishes_and_lists_completed_sessions() {
        let connection = open_test_connection("finish");

        let active = insert_session(&connection, &new_session(at(9, 30))).expect("start");
        let loaded = get_active_session(&connection, USER)
            .expect("query")
            .expect("session should be active");
        assert_eq!(loaded, active);

        assert!(finish_session(&connection, &active.id, &completion(at(11, 15), 7.875)).expect("finish"));
        assert!(!finish_session(&connection, &active.id, &completion(at(11, 20), 1.0)).expect("finish"));
        assert_eq!(get_active_session(&connection, USER).expect("query"), None);

        let history = list_completed_sessions(&connection, USER, 10).expect("query");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total_cost, 7.875);
        assert_eq!(history[0].region, Region::No5);
        assert_eq!(history[0].watt_mode, WattMode::Average);
        assert_eq!(history[0].finished_at, at(11, 15));
    }

    #[test]
    fn cancelled_sessions_are_excluded_from_history() {
        let connection = open_test_connection("cancel");

        let active = insert_session(&connection, &new_session(at(9, 0))).expect("start");
        assert!(cancel_session(&connection, &active.id, at(9, 10)).expect("cancel"));

        assert_eq!(get_active_session(&connection, USER).expect("query"), None);
        assert!(list_completed_sessions(&connection, USER, 10).expect("query").is_empty());

        insert_session(&connection, &new_session(at(10, 0))).expect("new start after cancel");
    }

    #[test]
    fn filters_completed_sessions_by_end_instant() {
        let connection = open_test_connection("between");

        for (start, end) in [(at(8, 0), at(9, 0)), (at(10, 0), at(11, 0)), (at(12, 0), at(13, 0))] {
            let active = insert_session(&connection, &new_session(start)).expect("start");
            finish_session(&connection, &active.id, &completion(end, 3.0)).expect("finish");
        }

        let window = list_completed_sessions_between(&connection, USER, at(9, 0), at(13, 0))
            .expect("query");

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].finished_at, at(11, 0));
        assert_eq!(window[1].finished_at, at(9, 0));
    }

    #[test]
    fn clear_keeps_the_active_session() {
        let connection = open_test_connection("clear");

        let done = insert_session(&connection, &new_session(at(8, 0))).expect("start");
        finish_session(&connection, &done.id, &completion(at(8, 30), 2.0)).expect("finish");
        insert_session(&connection, &new_session(at(9, 0) + TimeDelta::minutes(1))).expect("start");

        assert_eq!(
            completed_session_totals(&connection, USER).expect("totals"),
            SessionTotals {
                count: 1,
                kwh: 2.25,
                total_cost: 2.0,
            }
        );

        assert_eq!(clear_sessions(&connection, USER).expect("clear"), 1);
        assert!(get_active_session(&connection, USER).expect("query").is_some());
        assert_eq!(
            completed_session_totals(&connection, USER).expect("totals"),
            SessionTotals::default()
        );
    }
}
