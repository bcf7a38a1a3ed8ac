mod health;

pub use health::{HealthController, HealthStatus};
