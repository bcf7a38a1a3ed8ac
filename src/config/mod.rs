mod app;
mod database;

pub use app::{AppConfig, BODY_LIMIT, DEFAULT_PORT, DEFAULT_VERSION, Environment};
pub use database::{
    ConnectionOptions, DEFAULT_DB_PORT, Driver, ENTITIES_GLOB, NamingStrategy, TlsConfig,
};
