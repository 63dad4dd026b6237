mod config_errors;
mod hook_errors;

pub use config_errors::ConfigError;
pub use hook_errors::{ArgumentError, HookError};
