use axum::{Extension, Json};
use sea_orm::DatabaseConnection;

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthStatus {
    /// `ok`, or `degraded` when the database does not answer.
    pub status: String,
    pub database: String,
}

impl HealthStatus {
    pub fn from_ping(reachable: bool) -> Self {
        let (status, database) = if reachable { ("ok", "up") } else { ("degraded", "down") };

        HealthStatus {
            status: status.into(),
            database: database.into(),
        }
    }
}

pub struct HealthController;

#[keystone_macros::controller]
impl HealthController {
    #[keystone_macros::get("/health")]
    #[keystone_macros::utoipa_response(status = 200, body = HealthStatus, description = "Liveness and database reachability")]
    pub async fn check(Extension(db): Extension<DatabaseConnection>) -> Json<HealthStatus> {
        let reachable = match db.ping().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("database ping failed: {:?}", err);
                false
            }
        };

        Json(HealthStatus::from_ping(reachable))
    }
}
