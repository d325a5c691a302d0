use crate::config::Config;
use crate::error::ConfigError;

/// Longest accepted debounce window.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.session.request_timeout_ms == 0 {
        errors.push(invalid(
            "session.request_timeout_ms",
            "must be greater than 0".to_string(),
        ));
    }

    if config.sync.debounce_ms > MAX_DEBOUNCE_MS {
        errors.push(invalid(
            "sync.debounce_ms",
            format!(
                "must be at most {MAX_DEBOUNCE_MS}, got {}",
                config.sync.debounce_ms
            ),
        ));
    }

    if config.formatting.tab_size == 0 || config.formatting.tab_size > 16 {
        errors.push(invalid(
            "formatting.tab_size",
            format!("must be 1\u{2013}16, got {}", config.formatting.tab_size),
        ));
    }

    for (language, entry) in &config.lsp.servers {
        if entry.command.trim().is_empty() {
            errors.push(invalid(
                &format!("lsp.servers.{language}.command"),
                "must not be empty".to_string(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}
