use keystone_core::config::{ConfigBuilder, Env};

pub const DEFAULT_PORT: u16 = 3001;
/// 50 MiB, for both JSON and URL-encoded bodies.
pub const BODY_LIMIT: usize = 50 * 1024 * 1024;
pub const DEFAULT_VERSION: &str = "1";

/// Runtime mode, read from `NODE_ENV`. Matching is exact and case-sensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Other(String),
    Unset,
}

impl Environment {
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode {
            Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => Environment::Other(other.to_string()),
            None => Environment::Unset,
        }
    }

    pub fn from_env(env: &Env) -> Self {
        Self::from_mode(env.get("NODE_ENV"))
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub environment: Environment,
    pub body_limit: usize,
    pub default_version: String,
}

impl ConfigBuilder for AppConfig {
    fn build(env: &Env) -> anyhow::Result<Self> {
        let port = match env.get("PORT") {
            None => {
                tracing::warn!("cannot read `PORT` defaulting to `{}`", DEFAULT_PORT);

                DEFAULT_PORT
            }
            Some(raw) => raw.trim().parse().unwrap_or_else(|err| {
                tracing::error!("cannot parse `PORT`. defaulting to {} {:?}", DEFAULT_PORT, err);
                DEFAULT_PORT
            }),
        };

        Ok(AppConfig {
            port,
            environment: Environment::from_env(env),
            body_limit: BODY_LIMIT,
            default_version: DEFAULT_VERSION.to_string(),
        })
    }
}
