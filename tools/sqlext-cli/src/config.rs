///
/// # Shell Configuration
///
/// Parses the optional `sqlext.toml` file that selects the log filter and the
/// built-in extensions enabled on every connection the shell opens.
///
/// ## Example sqlext.toml
///
/// ```toml
/// [log]
/// filter = "sqlext=debug"
///
/// [extensions]
/// functions = ["unicode_upper", "unicode_lower"]
/// collations = ["unicode_nocase"]
/// tokenizers = ["unicode_words"]
/// ```
///
/// Every section is optional. Names are checked against the built-in lists
/// before any connection is touched, so a typo fails fast.
///

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use sqlext::builtins::{
    collation_named, function_named, register_tokenizer_named, COLLATION_NAMES, FUNCTION_NAMES,
    TOKENIZER_NAMES,
};
use sqlext::Database;

use crate::errors::CliError;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExtensionsConfig {
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub collations: Vec<String>,
    #[serde(default)]
    pub tokenizers: Vec<String>,
}

impl CliConfig {
    pub fn parse(content: &str) -> Result<Self, CliError> {
        let config: CliConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Err(CliError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: CliConfig = toml::from_str(&content).map_err(|e| CliError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CliError> {
        check_names("function", &self.extensions.functions, FUNCTION_NAMES)?;
        check_names("collation", &self.extensions.collations, COLLATION_NAMES)?;
        check_names("tokenizer", &self.extensions.tokenizers, TOKENIZER_NAMES)
    }

    pub fn log_filter(&self) -> &str {
        self.log.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Registers the configured extensions on `db`.
    pub fn apply(&self, db: &Database) -> Result<(), CliError> {
        for name in &self.extensions.functions {
            let function = function_named(name).ok_or_else(|| unknown("function", name, FUNCTION_NAMES))?;
            db.register_function(&function)?;
            debug!(function = %name, "enabled function");
        }
        for name in &self.extensions.collations {
            let collation =
                collation_named(name).ok_or_else(|| unknown("collation", name, COLLATION_NAMES))?;
            db.register_collation(&collation)?;
            debug!(collation = %name, "enabled collation");
        }
        for name in &self.extensions.tokenizers {
            if !register_tokenizer_named(db, name)? {
                return Err(unknown("tokenizer", name, TOKENIZER_NAMES));
            }
            debug!(tokenizer = %name, "enabled tokenizer");
        }
        Ok(())
    }
}

fn check_names(kind: &'static str, names: &[String], available: &[&str]) -> Result<(), CliError> {
    match names.iter().find(|name| !available.contains(&name.as_str())) {
        Some(name) => Err(unknown(kind, name, available)),
        None => Ok(()),
    }
}

fn unknown(kind: &'static str, name: &str, available: &[&str]) -> CliError {
    CliError::UnknownExtension {
        kind,
        name: name.to_string(),
        available: available.iter().map(|s| s.to_string()).collect(),
    }
}
