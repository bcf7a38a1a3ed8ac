use anyhow::Context;
use sea_orm::{Database, DatabaseConnection};

use crate::config::ConnectionOptions;

pub async fn init_database(options: &ConnectionOptions) -> anyhow::Result<DatabaseConnection> {
    options.validate()?;

    tracing::info!(
        address = %options.address(),
        tls = options.tls.is_some(),
        "connecting to database"
    );

    let db = Database::connect(options.connect_options())
        .await
        .with_context(|| format!("cannot connect to database at {}", options.address()))?;

    tracing::info!(
        entities = %options.entities,
        synchronize = options.synchronize,
        "database connected"
    );

    Ok(db)
}
