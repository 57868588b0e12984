//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    DispatchConfig, LogOutput, LoggingConfig, StorageBackend, StorageConfig, TallyConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &TallyConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_storage_config(&config.storage)?;
    validate_dispatch_config(&config.dispatch)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_storage_config(storage: &StorageConfig) -> ConfigResult<()> {
    if storage.backend == StorageBackend::File && storage.base_dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("storage.base_dir"));
    }
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.ack_deadline_ms == 0 {
        return Err(ConfigError::validation(
            "Acknowledgment deadline must be greater than 0",
        ));
    }

    if dispatch.slow_handler_ms == 0 {
        return Err(ConfigError::validation(
            "Slow handler threshold must be greater than 0",
        ));
    }

    if dispatch.max_concurrency == 0 {
        return Err(ConfigError::validation(
            "Max concurrency must be greater than 0",
        ));
    }

    // Users must always get some text back.
    if dispatch.failure_message.trim().is_empty() {
        return Err(ConfigError::missing_field("dispatch.failure_message"));
    }
    if dispatch.not_found_message.trim().is_empty() {
        return Err(ConfigError::missing_field("dispatch.not_found_message"));
    }

    Ok(())
}
