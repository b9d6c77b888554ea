pub mod retry;

use config::{Environment, File, FileFormat};
use tracing::info;

use crate::models::common::Config;
use crate::models::errors::ConfigError;

/// Loads an optional YAML file overlaid by environment variables, then validates.
pub fn load_config(file_name: &str) -> Result<Config, ConfigError> {
    info!("Config path: {} (optional, environment takes precedence)", file_name);

    let builder = config::Config::builder()
        .add_source(File::new(file_name, FileFormat::Yaml).required(false))
        .add_source(
            Environment::default()
                .separator("__")
                .try_parsing(true),
        );

    config_from_builder(builder)
}

pub fn config_from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<Config, ConfigError> {
    let config: Config = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

pub(crate) fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        error.to_string()
    }
}
