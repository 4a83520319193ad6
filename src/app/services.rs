use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::{DbError, SessionTotals};
use crate::domain::models::{
    ActiveSession, Appliance, CompletedSession, NewAppliance, NewSession, SessionCompletion,
    UserId, UserSettings,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

pub trait TrackerQueryHandler {
    fn user_settings(&self, user_id: UserId) -> Result<UserSettings, ServiceError>;
    fn appliance(&self, user_id: UserId, name: &str) -> Result<Option<Appliance>, ServiceError>;
    fn appliances(&self, user_id: UserId) -> Result<Vec<Appliance>, ServiceError>;
    fn active_session(&self, user_id: UserId) -> Result<Option<ActiveSession>, ServiceError>;
    fn recent_sessions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<CompletedSession>, ServiceError>;
    fn sessions_finished_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CompletedSession>, ServiceError>;
    fn session_totals(&self, user_id: UserId) -> Result<SessionTotals, ServiceError>;
    fn has_settings(&self, user_id: UserId) -> Result<bool, ServiceError>;
}

pub trait TrackerCommandHandler {
    fn save_user_settings(
        &self,
        user_id: UserId,
        settings: &UserSettings,
    ) -> Result<(), ServiceError>;
    fn add_appliance(
        &self,
        user_id: UserId,
        appliance: &NewAppliance,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Appliance>, ServiceError>;
    fn delete_appliance(&self, user_id: UserId, name: &str) -> Result<bool, ServiceError>;
    fn start_session(&self, new_session: &NewSession) -> Result<ActiveSession, ServiceError>;
    fn finish_session(
        &self,
        session_id: &str,
        completion: &SessionCompletion,
    ) -> Result<bool, ServiceError>;
    fn cancel_session(
        &self,
        session_id: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;
    fn clear_sessions(&self, user_id: UserId) -> Result<usize, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteTrackerService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteTrackerService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl TrackerQueryHandler for SqliteTrackerService {
    fn user_settings(&self, user_id: UserId) -> Result<UserSettings, ServiceError> {
        self.with_connection(|connection| db::get_user_settings(connection, user_id))
            .map(Option::unwrap_or_default)
    }

    fn appliance(&self, user_id: UserId, name: &str) -> Result<Option<Appliance>, ServiceError> {
        self.with_connection(|connection| db::get_appliance_by_name(connection, user_id, name))
    }

    fn appliances(&self, user_id: UserId) -> Result<Vec<Appliance>, ServiceError> {
        self.with_connection(|connection| db::list_appliances(connection, user_id))
    }

    fn active_session(&self, user_id: UserId) -> Result<Option<ActiveSession>, ServiceError> {
        self.with_connection(|connection| db::get_active_session(connection, user_id))
    }

    fn recent_sessions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<CompletedSession>, ServiceError> {
        self.with_connection(|connection| db::list_completed_sessions(connection, user_id, limit))
    }

    fn sessions_finished_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CompletedSession>, ServiceError> {
        self.with_connection(|connection| {
            db::list_completed_sessions_between(connection, user_id, from, to)
        })
    }

    fn session_totals(&self, user_id: UserId) -> Result<SessionTotals, ServiceError> {
        self.with_connection(|connection| db::completed_session_totals(connection, user_id))
    }

    fn has_settings(&self, user_id: UserId) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::get_user_settings(connection, user_id))
            .map(|settings| settings.is_some())
    }
}

impl TrackerCommandHandler for SqliteTrackerService {
    fn save_user_settings(
        &self,
        user_id: UserId,
        settings: &UserSettings,
    ) -> Result<(), ServiceError> {
        self.with_connection(|connection| db::upsert_user_settings(connection, user_id, settings))
    }

    fn add_appliance(
        &self,
        user_id: UserId,
        appliance: &NewAppliance,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Appliance>, ServiceError> {
        self.with_connection(|connection| {
            db::insert_appliance(connection, user_id, appliance, created_at)
        })
    }

    fn delete_appliance(&self, user_id: UserId, name: &str) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::delete_appliance(connection, user_id, name))
    }

    fn start_session(&self, new_session: &NewSession) -> Result<ActiveSession, ServiceError> {
        self.with_connection(|connection| db::insert_session(connection, new_session))
    }

    fn finish_session(
        &self,
        session_id: &str,
        completion: &SessionCompletion,
    ) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::finish_session(connection, session_id, completion))
    }

    fn cancel_session(
        &self,
        session_id: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::cancel_session(connection, session_id, cancelled_at))
    }

    fn clear_sessions(&self, user_id: UserId) -> Result<usize, ServiceError> {
        self.with_connection(|connection| db::clear_sessions(connection, user_id))
    }
}
