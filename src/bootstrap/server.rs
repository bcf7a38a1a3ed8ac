use std::net::SocketAddr;

use anyhow::Context;
use keystone_core::config::{ConfigBuilder, Env};
use keystone_core::{AppModule, Application, VersioningOptions};
use tower_http::cors::AllowOrigin;

use crate::config::{AppConfig, ConnectionOptions};
use crate::{docs, logs, routes};

/// Builds the application with its cross-cutting middleware and docs. Every
/// step here runs before the listener exists.
pub fn assemble(module: AppModule, config: &AppConfig) -> anyhow::Result<Application> {
    let mut app = Application::create(module).context("cannot create application")?;

    app.use_compression()
        .use_body_parser(config.body_limit)
        .enable_versioning(VersioningOptions::uri(config.default_version.clone()));

    docs::mount_api_docs(&mut app).context("cannot generate API document")?;
    logs::mount_api_logs(&mut app, &config.environment);

    // Inside stats and the access log, so preflight requests answered by
    // CORS are still counted and logged.
    app.enable_cors(AllowOrigin::any());

    Ok(app)
}

pub async fn init_server(env: &Env) -> anyhow::Result<()> {
    let config = AppConfig::build(env)?;
    let database = ConnectionOptions::build(env)?;

    let db = super::init_database(&database).await?;

    let mut app = assemble(routes::app_module(), &config)?;
    app.extension(db);

    // Build the router
    let router = app.into_router()?;

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    tracing::info!(environment = ?config.environment, "Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for ctrl-c: {:?}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("cannot listen for SIGTERM: {:?}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
