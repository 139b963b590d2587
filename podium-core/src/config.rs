//! Configuration loading and validation.
//!
//! Configuration is read from a TOML file, after which a small set of
//! `PODIUM_*` environment variables may override individual fields.

use crate::error::{PodiumError, PodiumResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PodiumConfig {
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long a user session stays valid, as a duration string
    /// ("30d", "12h 30m"). See [`parse_duration`] for the grammar.
    pub max_session_age: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_session_age: "30d".to_string(),
        }
    }
}

impl AuthConfig {
    /// The configured session lifetime as a [`chrono::Duration`].
    pub fn session_lifetime(&self) -> PodiumResult<chrono::Duration> {
        parse_duration(&self.max_session_age)
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://podium.db?mode=rwc".to_string(),
        }
    }
}

impl PodiumConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PodiumResult<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PodiumError::config(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: PodiumConfig = toml::from_str(&content)
            .map_err(|e| PodiumError::config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration: the file if given, defaults otherwise, then
    /// environment overrides on top.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> PodiumResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `PODIUM_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PODIUM_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(age) = std::env::var("PODIUM_MAX_SESSION_AGE") {
            self.auth.max_session_age = age;
        }
        if let Ok(level) = std::env::var("PODIUM_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Check the configuration for values that would fail later.
    pub fn validate(&self) -> PodiumResult<()> {
        let lifetime = self.auth.session_lifetime()?;
        if lifetime <= chrono::Duration::zero() {
            return Err(PodiumError::config(
                "auth.max_session_age must be a positive duration",
            ));
        }
        if self.database.url.is_empty() {
            return Err(PodiumError::config("database.url must not be empty"));
        }
        Ok(())
    }
}

/// Parse a human-readable duration string.
///
/// The grammar is whitespace-separated parts of `<integer><unit>`, where
/// the unit is one of `s`, `m`, `h`, `d` or `w`. Parts are summed, so
/// "1w 2d" is nine days.
pub fn parse_duration(raw: &str) -> PodiumResult<chrono::Duration> {
    let mut seconds: i64 = 0;
    if raw.trim().is_empty() {
        return Err(PodiumError::validation_field(
            "empty duration",
            "max_session_age",
        ));
    }
    for part in raw.split_whitespace() {
        let unit = part.chars().next_back().unwrap_or_default();
        let value = &part[..part.len() - unit.len_utf8()];
        let multiplier = match unit {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 60 * 60 * 24,
            'w' => 60 * 60 * 24 * 7,
            _ => {
                return Err(PodiumError::validation_field(
                    format!("unknown duration unit '{}' in '{}'", unit, part),
                    "max_session_age",
                ))
            }
        };
        let value: i64 = value.parse().map_err(|_| {
            PodiumError::validation_field(
                format!("invalid duration value '{}'", part),
                "max_session_age",
            )
        })?;
        seconds += value * multiplier;
    }
    Ok(chrono::Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_unit_durations() {
        assert_eq!(parse_duration("30s").unwrap(), chrono::Duration::seconds(30));
        assert_eq!(parse_duration("5m").unwrap(), chrono::Duration::minutes(5));
        assert_eq!(parse_duration("12h").unwrap(), chrono::Duration::hours(12));
        assert_eq!(parse_duration("30d").unwrap(), chrono::Duration::days(30));
        assert_eq!(parse_duration("2w").unwrap(), chrono::Duration::weeks(2));
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(
            parse_duration("1w 2d").unwrap(),
            chrono::Duration::days(9)
        );
        assert_eq!(
            parse_duration("1h 30m").unwrap(),
            chrono::Duration::minutes(90)
        );
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30x").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("ten minutes").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let config = PodiumConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.auth.session_lifetime().unwrap(),
            chrono::Duration::days(30)
        );
    }

    #[test]
    fn loads_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podium.toml");
        std::fs::write(
            &path,
            r#"
[auth]
max_session_age = "12h"

[database]
url = "sqlite::memory:"
"#,
        )
        .unwrap();

        let config = PodiumConfig::from_file(&path).unwrap();
        assert_eq!(
            config.auth.session_lifetime().unwrap(),
            chrono::Duration::hours(12)
        );
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn rejects_invalid_session_age_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podium.toml");
        std::fs::write(&path, "[auth]\nmax_session_age = \"soon\"\n").unwrap();
        assert!(PodiumConfig::from_file(&path).is_err());
    }
}
