mod connection;
mod memory_store;
mod record_entity;
mod repository;

pub use connection::{create_connection, run_migrations, RECORDS_TABLE};
pub use memory_store::MemoryRecordStore;
pub use record_entity::{Entity as RecordEntity, Model as RecordModel};
pub use repository::{RecordStore, SeaOrmRecordStore};
