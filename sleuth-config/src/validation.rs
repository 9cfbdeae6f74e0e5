// sleuth-config/src/validation.rs
//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate that an interface name is a plausible device identifier.
pub fn validate_interface(name: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(r"^[A-Za-z0-9_.:@{}\\-]{1,128}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;

    if re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_interface"))
    }
}

/// Validate a log filter: comma separated `level` or `target=level` items.
pub fn validate_log_level(directive: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(
        r"(?i)^([A-Za-z0-9_:\-]+=)?(trace|debug|info|warn|error|off)(,([A-Za-z0-9_:\-]+=)?(trace|debug|info|warn|error|off))*$",
    )
    .map_err(|_| ValidationError::new("invalid_regex"))?;

    if re.is_match(directive) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
