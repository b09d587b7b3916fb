// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{DatabaseConfig, DatabaseEngine};
use crate::types::CoreError;

pub const RECORDS_TABLE: &str = "kv_records";

/// Postgres: serialization_failure, deadlock_detected, unique_violation.
const PG_CONFLICT_CODES: &[&str] = &["40001", "40P01", "23505"];
/// SQLite extended codes: BUSY, LOCKED, CONSTRAINT_PRIMARYKEY, CONSTRAINT_UNIQUE.
const SQLITE_CONFLICT_CODES: &[&str] = &["5", "6", "1555", "2067"];

impl From<DbErr> for CoreError {
    fn from(e: DbErr) -> Self {
        match &e {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
                CoreError::Unavailable(format!("Database connection failed: {}", e))
            }
            DbErr::RecordNotFound(msg) => CoreError::NotFound(msg.clone()),
            _ => classify_runtime_error(&e)
                .unwrap_or_else(|| CoreError::InternalError(format!("Database error: {}", e))),
        }
    }
}

#[cfg(any(feature = "postgresql", feature = "sqlite"))]
fn classify_runtime_error(e: &DbErr) -> Option<CoreError> {
    use sea_orm::RuntimeErr;

    let sqlx_err = match e {
        DbErr::Exec(RuntimeErr::SqlxError(err)) | DbErr::Query(RuntimeErr::SqlxError(err)) => err,
        _ => return None,
    };

    match sqlx_err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Some(CoreError::Unavailable(format!(
            "Database connection lost: {}",
            sqlx_err
        ))),
        sqlx::Error::Database(db_err) => {
            let code = db_err.code()?;
            if PG_CONFLICT_CODES.contains(&code.as_ref())
                || SQLITE_CONFLICT_CODES.contains(&code.as_ref())
            {
                Some(CoreError::Conflict(format!(
                    "Database conflict ({}): {}",
                    code,
                    db_err.message()
                )))
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(not(any(feature = "postgresql", feature = "sqlite")))]
fn classify_runtime_error(_e: &DbErr) -> Option<CoreError> {
    None
}

pub async fn create_connection(config: &DatabaseConfig) -> Result<DatabaseConnection, CoreError> {
    if config.engine == DatabaseEngine::Memory {
        return Err(CoreError::ConfigurationError(
            "The memory engine has no database connection".to_string(),
        ));
    }
    if config.engine == DatabaseEngine::Postgresql
        && config.url.is_empty()
        && config.username.is_empty()
    {
        return Err(CoreError::ConfigurationError(
            "Database username not configured".to_string(),
        ));
    }

    let final_url = config.connection_url();
    let mut connect_options = ConnectOptions::new(final_url);

    if config.engine != DatabaseEngine::Sqlite {
        connect_options
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds));
    } else if is_in_memory_url(&config.connection_url()) {
        // every pooled connection would open its own empty database
        connect_options.max_connections(1).min_connections(1);
    }
    connect_options.sqlx_logging(false);

    info!(
        "Connecting to {} database at {}:{}",
        config.engine, config.host, config.port
    );

    let db = Database::connect(connect_options)
        .await
        .map_err(CoreError::from)?;

    info!("Database connection established successfully");

    Ok(db)
}

fn is_in_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Creates the records table when missing.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), CoreError> {
    info!("Running database migrations...");

    let backend = db.get_database_backend();
    let blob_type = match backend {
        DbBackend::Postgres => "BYTEA",
        _ => "BLOB",
    };

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            "key" VARCHAR(512) PRIMARY KEY,
            value {} NOT NULL,
            version BIGINT NOT NULL DEFAULT 1,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        RECORDS_TABLE, blob_type
    );

    let stmt = Statement::from_string(backend, sql);
    match db.execute(stmt).await {
        Ok(_) => info!("Table created/verified: {}", RECORDS_TABLE),
        Err(e) => {
            let error_msg = e.to_string();
            if error_msg.contains("already exists") {
                warn!("Table {} already exists, skipping", RECORDS_TABLE);
            } else {
                return Err(CoreError::InternalError(format!(
                    "Failed to create table: {}",
                    error_msg
                )));
            }
        }
    }

    info!("Database migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnAcquireErr, RuntimeErr};

    #[test]
    fn test_connection_errors_are_unavailable() {
        let err: CoreError = DbErr::ConnectionAcquire(ConnAcquireErr::Timeout).into();
        assert!(matches!(err, CoreError::Unavailable(_)));

        let err: CoreError = DbErr::Conn(RuntimeErr::Internal("reset".to_string())).into();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err: CoreError = DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, CoreError::InternalError(_)));

        let err: CoreError = DbErr::RecordNotFound("k".to_string()).into();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_engine_has_no_connection() {
        let config = DatabaseConfig {
            engine: DatabaseEngine::Memory,
            ..Default::default()
        };
        assert!(matches!(
            create_connection(&config).await,
            Err(CoreError::ConfigurationError(_))
        ));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_connection_and_migrations() {
        let config = DatabaseConfig {
            engine: DatabaseEngine::Sqlite,
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };

        let conn = create_connection(&config).await.unwrap();
        run_migrations(&conn).await.unwrap();
        // idempotent
        run_migrations(&conn).await.unwrap();
    }
}
