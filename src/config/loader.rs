//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn parse_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        // An empty document deserializes to unit, not to an all-defaults map.
        let config: Config = if expanded.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR_NAME}` or
    /// `${VAR_NAME:-default}`. Unknown variables without a default keep their
    /// placeholder.
    fn expand_env_vars(content: &str) -> String {
        let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        let mut last_match = 0;
        let mut result = String::with_capacity(content.len());

        for cap in re.captures_iter(content) {
            let full_match = cap.get(0).unwrap();
            let var_name = &cap[1];

            result.push_str(&content[last_match..full_match.start()]);

            let value = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => full_match.as_str().to_string(),
                },
            };
            result.push_str(&value);

            last_match = full_match.end();
        }

        result.push_str(&content[last_match..]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("MIZUCHI_TEST_VAR", "test_value");
        let content = "key: ${MIZUCHI_TEST_VAR}";
        let expanded = ConfigLoader::expand_env_vars(content);
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("MIZUCHI_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_default() {
        std::env::remove_var("MIZUCHI_MISSING_VAR");
        let expanded = ConfigLoader::expand_env_vars("region: ${MIZUCHI_MISSING_VAR:-eu-west-1}");
        assert_eq!(expanded, "region: eu-west-1");

        let kept = ConfigLoader::expand_env_vars("region: ${MIZUCHI_MISSING_VAR}");
        assert_eq!(kept, "region: ${MIZUCHI_MISSING_VAR}");
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = ConfigLoader::parse_str("").unwrap();
        assert_eq!(config.backup.workers, 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ConfigLoader::parse_str("backup:\n  workers: 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
