use std::path::PathBuf;

/// Loads `.env` into the process environment. Variables already set win over
/// the file.
pub fn init_env() -> Result<PathBuf, dotenvy::Error> {
    dotenvy::dotenv()
}

/// Logging is not up yet when `.env` is read, so the outcome is reported
/// afterwards.
pub fn report(result: Result<PathBuf, dotenvy::Error>) {
    match result {
        Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
        Err(err) if err.not_found() => tracing::debug!("no `.env` file found"),
        Err(err) => tracing::warn!("ignoring malformed `.env` file: {}", err),
    }
}
