//! Configuration file for the CLI.

use manga_text_detect::core::config::ConfigValidator;
use manga_text_detect::core::errors::DetectorError;
use manga_text_detect::detector::RegistryConfig;
use manga_text_detect::domain::{DetectionParams, HybridConfig};
use serde::Deserialize;
use std::path::Path;

/// TOML file with optional `[params]`, `[hybrid]` and `[registry]` tables.
///
/// ```toml
/// [params]
/// detect_size = 1536
/// auto_rotate = true
///
/// [hybrid]
/// enabled = true
/// conf = 0.35
///
/// [registry]
/// model_dir = "/opt/models"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub params: DetectionParams,
    pub hybrid: HybridConfig,
    pub registry: RegistryConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| match e {
            DetectorError::ConfigError { message } => {
                DetectorError::config_error_detailed(format!("invalid {}", path.display()), message)
            }
            other => other,
        })
    }

    /// Parses and validates every table of a configuration file.
    pub fn from_toml_str(text: &str) -> Result<Self, DetectorError> {
        let config: FileConfig = toml::from_str(text)
            .map_err(|e| DetectorError::config_error_detailed("failed to parse TOML", e.to_string()))?;
        config.params.validate()?;
        config.hybrid.validate()?;
        config.registry.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_keep_other_defaults() {
        let config = FileConfig::from_toml_str(
            r#"
            [params]
            detect_size = 1536

            [registry.obb]
            dedup_iou = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.params.detect_size, 1536);
        assert_eq!(config.registry.obb.dedup_iou, 0.5);
        assert_eq!(config.registry.obb.input_size, 640);
    }

    #[test]
    fn test_bad_obb_table_is_rejected() {
        for table in ["input_size = 0", "dedup_iou = 5.0"] {
            let err = FileConfig::from_toml_str(&format!("[registry.obb]\n{table}\n")).unwrap_err();
            assert!(matches!(err, DetectorError::ConfigError { .. }), "{table}: {err}");
        }
    }

    #[test]
    fn test_load_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detect.toml");
        std::fs::write(&path, "[registry.obb]\ninput_size = 0\n").unwrap();
        let err = FileConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("detect.toml"), "{err}");
    }
}
