use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::middleware::Next;
use axum::response::Response;
use keystone_core::Application;

use crate::config::Environment;

pub const ACCESS_LOG_TARGET: &str = "keystone::access";

/// Attaches the access log, only when running in development. Returns whether
/// it was attached.
pub fn mount_api_logs(app: &mut Application, environment: &Environment) -> bool {
    if !environment.is_development() {
        return false;
    }

    app.layer("access-log", axum::middleware::from_fn(access_log));
    true
}

/// One line per request: `GET /v1/health 200 0.412 ms - 15`.
async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| response.body().size_hint().exact().map(|len| len.to_string()))
        .unwrap_or_else(|| "-".to_owned());

    tracing::info!(
        target: ACCESS_LOG_TARGET,
        "{} {} {} {:.3} ms - {}",
        method,
        uri,
        response.status().as_u16(),
        elapsed_ms,
        length
    );

    response
}
