use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::Value,
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable prefix; nested keys use `__`, e.g.
/// `CRAWLRT_CRAWL__TIMEOUT_LIMIT=30`.
const ENV_PREFIX: &str = "CRAWLRT_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with(Some(path), &[])
}

/// Load configuration from an optional file, the environment and explicit
/// `dotted.key = value` overrides, later sources winning.
///
/// Override values are parsed the way environment values are, so
/// `("crawl.timeout_limit", "30")` yields a number.
pub fn load_config_with(
    path: Option<&Path>,
    overrides: &[(String, String)],
) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    for (key, raw) in overrides {
        let value: Value = raw
            .parse()
            .map_err(|_| ConfigError::ParseError(format!("invalid value for {}", key)))?;
        figment = figment.merge(Serialized::global(key.as_str(), value));
    }

    figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
