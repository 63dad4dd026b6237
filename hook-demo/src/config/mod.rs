mod config;

pub use config::{find_config_file, Config, LoggingConfig, ScenarioConfig};
