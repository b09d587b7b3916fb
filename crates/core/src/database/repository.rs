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

use async_trait::async_trait;
use bytes::Bytes;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, info};

use crate::database::record_entity::{
    ActiveModel as RecordActiveModel, Column as RecordColumn, Entity as RecordEntity,
};
use crate::types::{CoreError, Record, Result};

/// Durable tier. Every mutating call runs in its own transaction.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Record>>;

    /// Inserts the record at version 1 or bumps the existing version by one.
    /// Returns the committed version.
    async fn write(&self, key: &str, value: Bytes) -> Result<u64>;

    /// Fails with `NotFound` when nothing was removed.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Number of records whose value equals `value` byte for byte.
    async fn count_by_value(&self, value: &[u8]) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

pub struct SeaOrmRecordStore {
    db: DatabaseConnection,
}

impl SeaOrmRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl RecordStore for SeaOrmRecordStore {
    async fn read(&self, key: &str) -> Result<Option<Record>> {
        let model = RecordEntity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(CoreError::from)?;

        Ok(model.map(Record::from))
    }

    async fn write(&self, key: &str, value: Bytes) -> Result<u64> {
        let txn = self.db.begin().await.map_err(CoreError::from)?;

        // SQLite serializes writers itself and has no row locks
        let mut query = RecordEntity::find_by_id(key.to_string());
        if self.db.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let existing = query.one(&txn).await.map_err(CoreError::from)?;

        let now = chrono::Utc::now().naive_utc();
        let version = match existing {
            Some(model) => {
                let next = model.version + 1;
                let mut updated: RecordActiveModel = model.into();
                updated.value = Set(value.to_vec());
                updated.version = Set(next);
                updated.updated_at = Set(now);

                updated.update(&txn).await.map_err(CoreError::from)?;
                debug!("Updated record {} to v{}", key, next);
                next
            }
            None => {
                let new_record = RecordActiveModel {
                    key: Set(key.to_string()),
                    value: Set(value.to_vec()),
                    version: Set(1),
                    updated_at: Set(now),
                };

                // a concurrent first write surfaces here as a unique violation
                new_record.insert(&txn).await.map_err(CoreError::from)?;
                info!("Created record {}", key);
                1
            }
        };

        txn.commit().await.map_err(CoreError::from)?;

        Ok(version as u64)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let txn = self.db.begin().await.map_err(CoreError::from)?;

        let result = RecordEntity::delete_by_id(key.to_string())
            .exec(&txn)
            .await
            .map_err(CoreError::from)?;

        txn.commit().await.map_err(CoreError::from)?;

        if result.rows_affected == 0 {
            return Err(CoreError::NotFound(format!("Record {} not found", key)));
        }
        debug!("Removed record {}", key);
        Ok(())
    }

    async fn count_by_value(&self, value: &[u8]) -> Result<u64> {
        RecordEntity::find()
            .filter(RecordColumn::Value.eq(value.to_vec()))
            .count(&self.db)
            .await
            .map_err(CoreError::from)
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await.map_err(CoreError::from)
    }
}
