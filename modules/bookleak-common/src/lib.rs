pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{Config, OracleProvider};
pub use error::BookLeakError;
pub use hash::content_hash;
pub use types::*;
