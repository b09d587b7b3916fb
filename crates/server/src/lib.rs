//! tiergate server: HTTP front-end, metrics listener and command shell

pub mod bootstrap;
pub mod error_handler;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod router;
pub mod shell;

pub use bootstrap::{build_services, Services};
pub use router::{create_metrics_router, create_router};
