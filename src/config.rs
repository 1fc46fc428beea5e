//! TOML-based engine configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::context::Options;
use crate::error::Result;

/// How to locate and drive the engine.
///
/// All fields have defaults; load from TOML with
/// [`EngineConfig::from_toml_file`] or start from [`EngineConfig::default`]
/// and set fields directly. When `library_path` is absent, the loader
/// falls back to the `DSS_RS_LIB` environment variable and then the
/// platform's default library name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Explicit path to the engine shared library.
    pub library_path: Option<PathBuf>,
    /// Return complex-capable results as complex values.
    pub complex_arrays: bool,
    /// Check the engine error cell after every call. Defaults to on.
    pub check_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            library_path: None,
            complex_arrays: false,
            check_errors: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The per-context options this configuration selects.
    pub fn options(&self) -> Options {
        Options {
            complex_arrays: self.complex_arrays,
            check_errors: self.check_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert!(cfg.library_path.is_none());
        assert!(!cfg.complex_arrays);
        assert!(cfg.check_errors);
    }

    #[test]
    fn full_toml_round_trips() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            library_path = "/opt/dss/libdss_capi.so"
            complex_arrays = true
            check_errors = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.library_path.as_deref(), Some(Path::new("/opt/dss/libdss_capi.so")));
        assert!(cfg.complex_arrays);
        assert!(!cfg.check_errors);
        assert_eq!(cfg.options(), crate::context::Options { complex_arrays: true, check_errors: false });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(EngineConfig::from_toml_str("libary_path = \"typo\"").is_err());
    }
}
