use std::fmt;
use std::time::Duration;

use anyhow::bail;
use keystone_core::config::{ConfigBuilder, Env};
use sea_orm::ConnectOptions;
use sea_orm::sqlx::postgres::{PgConnectOptions, PgSslMode};

use super::app::Environment;

pub const DEFAULT_DB_PORT: u16 = 12754;
/// Where entity modules live, relative to the crate root.
pub const ENTITIES_GLOB: &str = "src/modules/**/entity.rs";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Driver {
    Postgres,
}

impl Driver {
    pub fn scheme(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
        }
    }
}

/// How struct and field names map to table and column names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamingStrategy {
    SnakeCase,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// When false the server certificate is not verified against `ca`.
    pub reject_unauthorized: bool,
    /// PEM bundle, with literal `\n` sequences already turned into newlines.
    pub ca: Option<String>,
}

impl TlsConfig {
    /// TLS is only configured in production.
    pub fn for_environment(environment: &Environment, ca: Option<&str>) -> Option<Self> {
        if !environment.is_production() {
            return None;
        }

        Some(TlsConfig {
            reject_unauthorized: false,
            ca: ca.map(|ca| ca.replace("\\n", "\n")),
        })
    }

    fn ssl_mode(&self) -> PgSslMode {
        if self.reject_unauthorized {
            PgSslMode::VerifyCa
        } else {
            PgSslMode::Require
        }
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("ca", &self.ca.as_ref().map(|ca| format!("<{} bytes>", ca.len())))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub driver: Driver,
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub tls: Option<TlsConfig>,
    pub naming_strategy: NamingStrategy,
    pub entities: String,
    pub time_zone: &'static str,
    pub synchronize: bool,
    pub logging: bool,
}

impl ConfigBuilder for ConnectionOptions {
    fn build(env: &Env) -> anyhow::Result<Self> {
        let environment = Environment::from_env(env);

        Ok(ConnectionOptions {
            driver: Driver::Postgres,
            host: env.get_owned("DB_HOST"),
            port: env.parse_or("DB_PORT", DEFAULT_DB_PORT)?,
            username: env.get_owned("DB_USERNAME"),
            password: env.get_owned("DB_PASSWORD"),
            database: env.get_owned("DB_DATABASE"),
            tls: TlsConfig::for_environment(&environment, env.get("DATABASE_SSL_CA")),
            naming_strategy: NamingStrategy::SnakeCase,
            entities: ENTITIES_GLOB.to_string(),
            time_zone: "UTC",
            synchronize: true,
            logging: false,
        })
    }
}

impl ConnectionOptions {
    /// Host, username and database are required to open a connection. The
    /// password may be empty for trust-authenticated servers.
    pub fn validate(&self) -> anyhow::Result<()> {
        let missing: Vec<&str> = [
            ("DB_HOST", &self.host),
            ("DB_USERNAME", &self.username),
            ("DB_DATABASE", &self.database),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|value| value.trim().is_empty()))
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            bail!("missing database settings: {}", missing.join(", "));
        }

        Ok(())
    }

    /// `host:port/database`, without credentials.
    pub fn address(&self) -> String {
        format!(
            "{}:{}/{}",
            self.host.as_deref().unwrap_or_default(),
            self.port,
            self.database.as_deref().unwrap_or_default()
        )
    }

    pub fn url(&self) -> String {
        format!("{}://{}", self.driver.scheme(), self.address())
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let username = self.username.clone();
        let password = self.password.clone();
        let tls = self.tls.clone();
        let time_zone = self.time_zone;

        let mut options = ConnectOptions::new(self.url());
        options
            .sqlx_logging(self.logging)
            .connect_timeout(Duration::from_secs(10))
            .map_sqlx_postgres_opts(move |mut pg: PgConnectOptions| {
                if let Some(username) = &username {
                    pg = pg.username(username);
                }
                if let Some(password) = &password {
                    pg = pg.password(password);
                }
                pg = pg.options([("timezone", time_zone)]);

                if let Some(tls) = &tls {
                    pg = pg.ssl_mode(tls.ssl_mode());
                    if let Some(ca) = &tls.ca {
                        pg = pg.ssl_root_cert_from_pem(ca.as_bytes().to_vec());
                    }
                }

                pg
            });

        options
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("tls", &self.tls)
            .field("naming_strategy", &self.naming_strategy)
            .field("entities", &self.entities)
            .field("time_zone", &self.time_zone)
            .field("synchronize", &self.synchronize)
            .field("logging", &self.logging)
            .finish()
    }
}
