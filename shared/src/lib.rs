pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod models;

pub use cache::CacheManager;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use models::*;
