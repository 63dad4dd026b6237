use flexi_logger::LogSpecification;
use serde::Deserialize;
use shared::constants::{CONFIG_ENV_VAR, CONFIG_FILE_NAME};
use shared::errors::ConfigError;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Demo configuration, loaded from TOML. Every section is optional.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: LoggingConfig,
    pub scenario: ScenarioConfig,
}

/// `[logging]`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// flexi_logger spec, e.g. `"info"` or `"hook_demo=debug,hooking_lib=trace"`
    pub level: String,
    /// Log to files in this directory instead of stderr
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            directory: None,
        }
    }
}

/// `[scenario]`: the operands passed to the hooked `add`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub a: i32,
    pub b: i32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self { a: 1, b: 1 }
    }
}

impl Config {
    /// Load, parse, and validate a `Config` from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&s)
    }

    /// Like [`Config::load`], but a missing file means "use the defaults".
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(toml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "logging.level",
                reason: "must not be empty".into(),
            });
        }
        LogSpecification::parse(&self.logging.level).map_err(|e| ConfigError::Validation {
            field: "logging.level",
            reason: e.to_string(),
        })?;

        // The hook computes a + b + 1.
        let ScenarioConfig { a, b } = self.scenario;
        if a.checked_add(b).and_then(|s| s.checked_add(1)).is_none() {
            return Err(ConfigError::Validation {
                field: "scenario",
                reason: format!("{a} + {b} + 1 overflows i32"),
            });
        }
        Ok(())
    }
}

/// Find the config path by checking the override environment variable first
/// and falling back to a file next to the running executable.
///
/// Never fails; the returned path may not exist.
pub fn find_config_file() -> PathBuf {
    if let Some(cfg) = env::var_os(CONFIG_ENV_VAR) {
        return PathBuf::from(cfg);
    }

    let mut exe_path = env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe_path.pop();
    exe_path.push(CONFIG_FILE_NAME);
    exe_path
}
