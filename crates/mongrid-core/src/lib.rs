pub mod config;
pub mod error;
pub mod types;

pub use config::MongoConfig;
pub use error::{ConfigError, ConfigResult};
pub use types::PoolKey;
