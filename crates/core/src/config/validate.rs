use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Session timeout is not 0
/// - Engine concurrency is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.crawl.timeout_limit == 0 {
        return Err(ConfigError::ValidationError(
            "crawl.timeout_limit must be at least 1 second".to_string(),
        ));
    }

    if config.engine.concurrent_requests == 0 {
        return Err(ConfigError::ValidationError(
            "engine.concurrent_requests cannot be 0".to_string(),
        ));
    }

    Ok(())
}
