use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::Result;

/// Immutable snapshot of the process environment.
///
/// Taken once at startup, after `.env` has been loaded, and handed to every
/// [`ConfigBuilder`]. Nothing below the bootstrap reads `std::env` itself.
#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Variables whose name or value is not valid unicode are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();

        Env { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        Env { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn get_owned(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_owned)
    }

    /// Parses `key`, falling back to `default` only when the variable is unset.
    /// A present but malformed value is an error.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|err| anyhow::anyhow!("cannot parse `{key}` (got {raw:?}): {err}")),
        }
    }
}

/// Trait for building configuration structs
///
/// Implementors read what they need from an [`Env`] snapshot. Building is a
/// pure function of that snapshot, so it can be exercised without touching
/// the real process environment.
pub trait ConfigBuilder: Clone + Send + Sync + 'static {
    /// Build the configuration instance
    fn build(env: &Env) -> Result<Self>;
}
