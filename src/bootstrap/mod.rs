mod database;
mod env;
mod server;
mod tracing;

use keystone_core::config::Env;

pub use database::init_database;
pub use server::{assemble, init_server};

/// Loads `.env`, starts logging and snapshots the environment. Must run before
/// anything else reads configuration.
pub fn init_base() -> Env {
    let dotenv = env::init_env();
    tracing::init_tracing();
    env::report(dotenv);

    Env::from_process()
}
