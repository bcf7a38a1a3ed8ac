pub mod application;
pub mod config;
pub mod controller;
pub mod module;
pub mod openapi;
pub mod response;
pub mod versioning;

pub use application::{Application, RouteInfo};
pub use config::{ConfigBuilder, Env};
pub use controller::{Controller, RouteDefinition};
pub use module::AppModule;
pub use versioning::VersioningOptions;
