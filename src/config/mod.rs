// src/config/mod.rs
mod models;

pub use models::*;

use config::{Environment, File};
use std::path::Path;

/// Prefix of environment variables overriding file settings, e.g.
/// `SERVICE_HEALTH__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "SERVICE_HEALTH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Load configuration from an optional file (YAML, JSON or TOML, picked by
/// extension) overlaid with environment variables.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path.as_ref()).required(true));
    }

    let settings: Settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}
