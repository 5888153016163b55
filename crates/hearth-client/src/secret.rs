//! Secret references in configuration values.
//!
//! `env::VAR_NAME` reads `$VAR_NAME`; anything else is used as-is. Keeps
//! OAuth client secrets out of `config.toml` on shared kiosk images.

/// Resolves a value that may be an `env::` reference.
pub fn resolve(value: &str) -> Result<String, String> {
    match value.strip_prefix("env::") {
        Some(var) => std::env::var(var.trim())
            .map_err(|_| format!("environment variable `{}` is not set", var.trim())),
        None => Ok(value.to_string()),
    }
}
