pub mod error;
pub mod record;

pub use error::*;
pub use record::*;
