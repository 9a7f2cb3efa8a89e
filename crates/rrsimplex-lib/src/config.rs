use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::detectors::ecg::EcgPipelineConfig;
use crate::error::{Result, SimplexError};
use crate::io::tabular::CandidateEncoding;

/// Top-level settings, usually read from `rrsimplex.toml`.
///
/// ```toml
/// [storage]
/// upload_dir = "uploads"
/// export_dir = "exports"
///
/// [loader]
/// encodings = ["utf-8", "utf-8-sig", "gbk", "gb2312", "latin1"]
/// delimiter = ","
///
/// [detector]
/// min_rr_s = 0.25
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexConfig {
    pub storage: StorageConfig,
    pub loader: LoaderSettings,
    pub detector: EcgPipelineConfig,
}

/// Where uploads land and where derived artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            export_dir: PathBuf::from("exports"),
        }
    }
}

impl StorageConfig {
    /// Both directories under one root; handy for tests and sandboxes.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            upload_dir: root.join("uploads"),
            export_dir: root.join("exports"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub encodings: Vec<CandidateEncoding>,
    pub delimiter: char,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            encodings: CandidateEncoding::DEFAULT_ORDER.to_vec(),
            delimiter: ',',
        }
    }
}

impl LoaderSettings {
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(SimplexError::Config(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            )))
        }
    }
}

impl SimplexConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SimplexConfig =
            toml::from_str(contents).map_err(|e| SimplexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents =
                    fs::read_to_string(path).map_err(|e| SimplexError::io(path, e))?;
                Self::from_toml_str(&contents)
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        self.loader.delimiter_byte()?;
        if self.loader.encodings.is_empty() {
            return Err(SimplexError::Config(
                "loader.encodings must list at least one encoding".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = SimplexConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.storage, StorageConfig::default());
        assert_eq!(cfg.loader.encodings.len(), 5);
        assert_eq!(cfg.loader.delimiter_byte().unwrap(), b',');
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = SimplexConfig::from_toml_str(
            r#"
            [storage]
            export_dir = "/tmp/out"

            [loader]
            encodings = ["latin1"]
            delimiter = ";"

            [detector]
            min_rr_s = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.export_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cfg.storage.upload_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.loader.encodings, vec![CandidateEncoding::Latin1]);
        assert_eq!(cfg.loader.delimiter_byte().unwrap(), b';');
        assert_eq!(cfg.detector.min_rr_s, 0.3);
        assert_eq!(cfg.detector.lowcut_hz, EcgPipelineConfig::default().lowcut_hz);
    }

    #[test]
    fn unknown_encoding_and_empty_list_are_rejected() {
        assert!(SimplexConfig::from_toml_str("[loader]\nencodings = [\"koi8\"]").is_err());
        assert!(SimplexConfig::from_toml_str("[loader]\nencodings = []").is_err());
        assert!(SimplexConfig::from_toml_str("[loader]\ndelimiter = \"§\"").is_err());
    }
}
