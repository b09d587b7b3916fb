pub mod cache;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod monitoring;
pub mod types;

#[cfg(test)]
pub mod tests;

pub use cache::*;
pub use config::*;
pub use coordinator::*;
pub use database::*;
pub use monitoring::*;
pub use types::*;
