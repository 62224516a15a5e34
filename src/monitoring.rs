//! Structured operation logging with correlation tracking
//!
//! Rebuilds, filter passes, border fetches and visibility passes each get an
//! [`OperationContext`]; start and completion records are emitted through the
//! `log` facade as JSON objects so a log file can be grepped by correlation id.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use log::{debug, error, info, trace, warn};

/// Monitoring and logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub operation_logging: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            operation_logging: true,
            log_level: LogLevel::Info,
        }
    }
}

impl MonitoringConfig {
    /// Nothing but errors
    pub fn quiet() -> Self {
        Self {
            operation_logging: false,
            log_level: LogLevel::Error,
        }
    }
}

/// Structured logger for engine operations
#[derive(Debug, Clone, Default)]
pub struct MapLogger {
    config: MonitoringConfig,
}

/// Context for a single engine operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub correlation_id: String,
    /// rebuild, filter, border_fetch, reconcile
    pub operation_type: String,
    pub map_id: String,
    pub metadata: HashMap<String, Value>,
    pub start_time: Instant,
}

impl OperationContext {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl MapLogger {
    pub fn new(config: MonitoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Start tracking a new operation with a fresh correlation id
    pub fn start_operation(&self, operation_type: &str, map_id: &str) -> OperationContext {
        let context = OperationContext {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            operation_type: operation_type.to_string(),
            map_id: map_id.to_string(),
            metadata: HashMap::new(),
            start_time: Instant::now(),
        };

        if self.config.operation_logging && self.should_log(LogLevel::Debug) {
            let log_data = json!({
                "event": "operation_started",
                "correlation_id": context.correlation_id,
                "operation_type": context.operation_type,
                "map_id": context.map_id,
                "timestamp": chrono::Utc::now().to_rfc3339()
            });

            debug!("Map Operation Started: {}", log_data);
        }

        context
    }

    pub fn add_metadata(&self, context: &mut OperationContext, key: &str, value: Value) {
        if self.should_log(LogLevel::Trace) {
            trace!("Added metadata to operation {}: {} = {}", context.correlation_id, key, value);
        }

        context.metadata.insert(key.to_string(), value);
    }

    /// Record an absorbed failure inside an operation
    pub fn log_failure(&self, context: &OperationContext, error: &str) {
        if !self.should_log(LogLevel::Warn) {
            return;
        }

        let log_data = json!({
            "event": "operation_failure",
            "correlation_id": context.correlation_id,
            "operation_type": context.operation_type,
            "map_id": context.map_id,
            "error": error,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        warn!("Map Operation Failure: {}", log_data);
    }

    pub fn complete_operation(&self, context: &OperationContext, success: bool) {
        if !self.config.operation_logging || !self.should_log(LogLevel::Info) {
            return;
        }

        let log_data = json!({
            "event": "operation_completed",
            "correlation_id": context.correlation_id,
            "operation_type": context.operation_type,
            "map_id": context.map_id,
            "duration_ms": context.elapsed().as_millis(),
            "success": success,
            "metadata": context.metadata,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if success {
            info!("Map Operation Completed: {}", log_data);
        } else {
            error!("Map Operation Failed: {}", log_data);
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        level <= self.config.log_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_gates_output() {
        let logger = MapLogger::new(MonitoringConfig {
            operation_logging: true,
            log_level: LogLevel::Warn,
        });
        assert!(logger.should_log(LogLevel::Error));
        assert!(logger.should_log(LogLevel::Warn));
        assert!(!logger.should_log(LogLevel::Info));
    }

    #[test]
    fn test_operations_get_distinct_correlation_ids() {
        let logger = MapLogger::default();
        let a = logger.start_operation("rebuild", "m");
        let b = logger.start_operation("rebuild", "m");

        assert_ne!(a.correlation_id, b.correlation_id);
        assert_eq!(a.operation_type, "rebuild");
        assert_eq!(a.map_id, "m");
    }

    #[test]
    fn test_metadata_is_recorded() {
        let logger = MapLogger::new(MonitoringConfig::quiet());
        let mut context = logger.start_operation("filter", "m");
        logger.add_metadata(&mut context, "surviving", json!(3));
        logger.complete_operation(&context, true);

        assert_eq!(context.metadata["surviving"], json!(3));
    }

    #[test]
    fn test_config_reads_lowercase_levels() {
        let config: MonitoringConfig = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.operation_logging);
    }
}
