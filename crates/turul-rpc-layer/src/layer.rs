//! Shared layer base: merged options plus the layer logger

use crate::error::ConfigError;
use crate::logging::{LayerLogger, LoggerConfig};
use crate::options::{LOGGER_OPTION, LayerOptions};

#[derive(Debug, Clone)]
pub struct LayerBase {
    name: String,
    options: LayerOptions,
    logger: LayerLogger,
}

impl LayerBase {
    /// Merge `options` over `defaults` and split off the logger block
    pub fn new(
        name: impl Into<String>,
        defaults: &LayerOptions,
        options: LayerOptions,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let mut options = options.merged_over(defaults);
        let logger_config = match options.remove(LOGGER_OPTION) {
            Some(value) => serde_json::from_value::<LoggerConfig>(value)
                .map_err(|e| ConfigError::new(format!("invalid '{}' option: {}", LOGGER_OPTION, e)))?,
            None => LoggerConfig::default(),
        };
        let logger = LayerLogger::new(name.clone(), logger_config);

        Ok(Self {
            name,
            options,
            logger,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    pub fn logger(&self) -> &LayerLogger {
        &self.logger
    }

    /// Same-call override: replaces the option set when `reset`, overlays otherwise
    pub fn apply(&mut self, options: LayerOptions, reset: bool) {
        self.options.overlay(options, reset);
    }
}
