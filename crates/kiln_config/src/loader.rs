//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::PipelineConfig;
use std::path::Path;

/// The configuration file name looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Loads and validates `<project_dir>/kiln.toml`.
pub fn load_config(project_dir: &Path) -> Result<PipelineConfig, ConfigError> {
    let path = project_dir.join(CONFIG_FILE_NAME);
    let content =
        std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.canonicalize.max_rewrites_per_op == 0 {
        return Err(ConfigError::InvalidValue {
            field: "canonicalize.max_rewrites_per_op",
            reason: "must be at least 1",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_default() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[canonicalize]
max_rewrites_per_op = 16
parallel = false
fold_constants = false

[passes]
const_prop = true
liveness_dce = false
unused_ports = true
dedup = false
inline = true
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.canonicalize.max_rewrites_per_op, 16);
        assert!(!config.canonicalize.parallel);
        assert!(!config.canonicalize.fold_constants);
        assert!(!config.passes.liveness_dce);
        assert!(!config.passes.dedup);
    }

    #[test]
    fn zero_cap_rejected() {
        let err = load_config_from_str("[canonicalize]\nmax_rewrites_per_op = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn unknown_field_rejected() {
        let err = load_config_from_str("[passes]\nretime = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = load_config_from_str("[passes\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[canonicalize]\nparallel = false\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(!config.canonicalize.parallel);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
