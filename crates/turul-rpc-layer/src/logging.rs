//! Per-layer logging sink
//!
//! Layers log through a [`LayerLogger`] built from the `logger` option block. Messages
//! are forwarded to `tracing` and tagged with the layer name, so the subscriber
//! installed by the application decides where they end up.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Logger configuration block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Whether the layer logs at all
    pub enabled: bool,
    /// Most verbose level that is still written
    pub level: LogLevel,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Debug,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayerLogger {
    layer: String,
    config: LoggerConfig,
}

impl LayerLogger {
    pub fn new(layer: impl Into<String>, config: LoggerConfig) -> Self {
        Self {
            layer: layer.into(),
            config,
        }
    }

    /// A logger that drops everything
    pub fn disabled(layer: impl Into<String>) -> Self {
        Self::new(
            layer,
            LoggerConfig {
                enabled: false,
                ..LoggerConfig::default()
            },
        )
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.config.enabled && level <= self.config.level
    }

    pub fn write(&self, level: LogLevel, message: impl fmt::Display) {
        if !self.is_enabled(level) {
            return;
        }
        let layer = self.layer.as_str();
        match level {
            LogLevel::Error => tracing::error!(layer, "{}", message),
            LogLevel::Warn => tracing::warn!(layer, "{}", message),
            LogLevel::Info => tracing::info!(layer, "{}", message),
            LogLevel::Debug => tracing::debug!(layer, "{}", message),
            LogLevel::Trace => tracing::trace!(layer, "{}", message),
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.write(LogLevel::Warn, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.write(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.write(LogLevel::Debug, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    #[test]
    fn test_level_threshold() {
        let logger = LayerLogger::new(
            "test",
            LoggerConfig {
                enabled: true,
                level: LogLevel::Info,
            },
        );
        assert!(logger.is_enabled(LogLevel::Error));
        assert!(logger.is_enabled(LogLevel::Info));
        assert!(!logger.is_enabled(LogLevel::Debug));

        assert!(!LayerLogger::disabled("test").is_enabled(LogLevel::Error));
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: LoggerConfig = serde_json::from_value(json!({"level": "warn"})).unwrap();
        assert!(config.enabled);
        assert_eq!(config.level, LogLevel::Warn);

        assert!(serde_json::from_value::<LoggerConfig>(json!({"level": "loud"})).is_err());
    }

    #[traced_test]
    #[test]
    fn test_messages_are_forwarded_to_tracing() {
        let logger = LayerLogger::new("json-server", LoggerConfig::default());
        logger.info("received request");
        logger.write(LogLevel::Trace, "too verbose");

        assert!(logs_contain("received request"));
        assert!(logs_contain("json-server"));
        assert!(!logs_contain("too verbose"));
    }
}
