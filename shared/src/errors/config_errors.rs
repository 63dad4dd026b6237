use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the demo's TOML configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },
}
