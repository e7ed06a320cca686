use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
///
/// `FULFILL_DATABASE_PATH=/data/shop.db` overrides `database.path`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("FULFILL_").split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[scheduling]
buffer_hours = 4

[orchestrator]
enabled = true
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.scheduling.buffer_hours, 4.0);
        assert!(config.orchestrator.enabled);
    }

    #[test]
    fn test_load_config_from_str_bad_enum() {
        let toml = r#"
[[assignment.rules]]
role = "printer"
strategy = "coin_flip"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/fulfillment.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[database]
path = "/tmp/shop.db"

[assignment]
batch_size = 50
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/tmp/shop.db");
        assert_eq!(config.assignment.batch_size, 50);
        assert_eq!(config.assignment.busy_threshold, 5);
    }
}
