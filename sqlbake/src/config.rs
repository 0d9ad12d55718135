//! `sqlbake.toml` configuration.
//!
//! Every field is optional; command-line flags take precedence over the
//! file, and built-in defaults fill whatever is left.
//!
//! # Example
//!
//! ```toml
//! output = "sqlite3.c"
//! dialect = "c"
//! function_name = "sqlite3ExecuteCompiledSql"
//! strict_escapes = false
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::dialect::{is_identifier, Dialect};
use crate::emit::EmitOptions;

/// File looked up in the working directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "sqlbake.toml";

/// Artifact written when no output is configured.
pub const DEFAULT_OUTPUT: &str = "sqlite3.c";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid function name '{name}': expected an identifier")]
    InvalidFunctionName { name: String },

    #[error("invalid function name '{name}': reserved word in {dialect}")]
    ReservedFunctionName { name: String, dialect: Dialect },
}

/// Generator settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Artifact the table is appended to; `-` is stdout
    pub output: Option<PathBuf>,

    /// Target language
    pub dialect: Option<Dialect>,

    /// Name of the entry routine
    pub function_name: Option<String>,

    /// Escape control bytes other than newline and tab
    pub strict_escapes: Option<bool>,
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Loads `sqlbake.toml` from `dir` if it exists.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    /// Checks field values that TOML types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.function_name {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidFunctionName { name: name.clone() });
            }
            let dialect = self.dialect.unwrap_or_default();
            if dialect.is_reserved(name) {
                return Err(ConfigError::ReservedFunctionName {
                    name: name.clone(),
                    dialect,
                });
            }
        }
        Ok(())
    }

    /// Layers `overrides` on top of `self`.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            output: overrides.output.or(self.output),
            dialect: overrides.dialect.or(self.dialect),
            function_name: overrides.function_name.or(self.function_name),
            strict_escapes: overrides.strict_escapes.or(self.strict_escapes),
        }
    }

    /// Output path, defaulting to [`DEFAULT_OUTPUT`].
    pub fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
    }

    /// Emission options with defaults filled in.
    pub fn emit_options(&self) -> EmitOptions {
        let dialect = self.dialect.unwrap_or_default();
        let mut options = EmitOptions::new(dialect)
            .with_escape(dialect.escape_policy(self.strict_escapes.unwrap_or(false)));
        if let Some(name) = &self.function_name {
            options = options.with_function_name(name.clone());
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::{EscapePolicy, NumericEscape};
    use tempfile::TempDir;

    #[test]
    fn test_parse_full() {
        let config = Config::parse(
            r#"
            output = "gen/dispatch.rs"
            dialect = "rust"
            function_name = "baked"
            strict_escapes = true
            "#,
        )
        .unwrap();
        assert_eq!(config.output(), PathBuf::from("gen/dispatch.rs"));

        let options = config.emit_options();
        assert_eq!(options.dialect, Dialect::Rust);
        assert_eq!(options.function_name, "baked");
        assert_eq!(options.escape, EscapePolicy::Strict(NumericEscape::Hex));
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.output(), PathBuf::from("sqlite3.c"));
        let options = config.emit_options();
        assert_eq!(options.dialect, Dialect::C);
        assert_eq!(options.function_name, "sqlite3ExecuteCompiledSql");
        assert_eq!(options.escape, EscapePolicy::Minimal);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::parse("outptu = \"x.c\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_bad_function_name() {
        let err = Config::parse("function_name = \"not valid\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFunctionName { .. }));
    }

    #[test]
    fn test_reserved_function_name() {
        let err = Config::parse("dialect = \"rust\"\nfunction_name = \"match\"").unwrap_err();
        assert!(matches!(err, ConfigError::ReservedFunctionName { .. }));
        assert_eq!(
            err.to_string(),
            "invalid function name 'match': reserved word in rust"
        );

        let err = Config::parse("function_name = \"int\"").unwrap_err();
        assert!(matches!(err, ConfigError::ReservedFunctionName { .. }));

        // Reserved only in the other dialect.
        assert!(Config::parse("dialect = \"rust\"\nfunction_name = \"int\"").is_ok());
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = Config {
            output: Some(PathBuf::from("a.c")),
            dialect: Some(Dialect::Rust),
            ..Config::default()
        };
        let cli = Config {
            output: Some(PathBuf::from("b.c")),
            ..Config::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.output(), PathBuf::from("b.c"));
        assert_eq!(merged.dialect, Some(Dialect::Rust));
    }

    #[test]
    fn test_discover() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap(), None);

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "dialect = \"rust\"\n").unwrap();
        let config = Config::discover(dir.path()).unwrap().unwrap();
        assert_eq!(config.dialect, Some(Dialect::Rust));
    }
}
