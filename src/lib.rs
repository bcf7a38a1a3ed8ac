pub mod app;
pub mod bootstrap;
pub mod config;
pub mod docs;
pub mod logs;
pub mod routes;
pub mod stats;
