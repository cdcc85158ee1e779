//! Utility functions

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::DeployError;

/// Version information for the deployer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl CooldownOptions {
    /// Doubling backoff starting at `base_delay`
    pub fn doubling(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Default::default()
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(exponent);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Quote a value for a POSIX shell, leaving plain tokens untouched
pub fn shell_quote(value: &str) -> String {
    let is_plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));

    if is_plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Fill `{placeholder}` slots in a command template with shell-quoted values.
///
/// Braces that do not enclose a lowercase identifier are copied through, so
/// templates may contain literal JSON or format strings.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String, DeployError> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let ident_len = after
            .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
            .unwrap_or(after.len());
        let closes = after[ident_len..].starts_with('}');

        if ident_len == 0 || !closes {
            rendered.push('{');
            rest = after;
            continue;
        }

        let key = &after[..ident_len];
        let value = vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                DeployError::ConfigError(format!("unknown placeholder {{{key}}} in template `{template}`"))
            })?;
        rendered.push_str(&shell_quote(value));
        rest = &after[ident_len + 1..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
