//! Syslog integration for audit logging.

use std::sync::{Mutex, OnceLock};

use syslog::{Facility, Formatter3164};
use tracing::{debug, error};

use super::error::TelemetryError;
use super::events::AuditEvent;

/// Syslog tag for all audit events.
pub const SYSLOG_TAG: &str = "SANDBOX_BROKER";

/// Global audit logger instance.
static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Audit logger that writes structured JSON events to syslog.
///
/// Uses interior mutability so it can live in a global `OnceLock`.
pub struct AuditLogger {
    /// `None` for a null logger.
    writer: Option<Mutex<syslog::Logger<syslog::LoggerBackend, Formatter3164>>>,
}

impl AuditLogger {
    /// Create a new audit logger connected to the local syslog socket.
    pub fn new() -> Result<Self, TelemetryError> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_AUTH,
            hostname: None,
            process: SYSLOG_TAG.to_string(),
            pid: std::process::id(),
        };

        let writer =
            syslog::unix(formatter).map_err(|e| TelemetryError::SyslogConnection(e.to_string()))?;

        debug!("Connected to syslog with tag '{}'", SYSLOG_TAG);
        Ok(Self {
            writer: Some(Mutex::new(writer)),
        })
    }

    /// Create a logger that discards all events.
    pub fn new_null() -> Self {
        Self { writer: None }
    }

    /// Log an audit event as one JSON line with an ISO8601 timestamp.
    pub fn log(&self, event: AuditEvent) {
        let json = match serde_json::to_string(&event.with_timestamp()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        if let Some(ref writer) = self.writer {
            match writer.lock() {
                Ok(mut writer) => {
                    if let Err(e) = writer.info(&json) {
                        error!("Failed to write to syslog: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to acquire syslog writer lock: {}", e);
                }
            }
        }
        debug!("Audit: {}", json);
    }

    /// Check if this is a null logger.
    pub fn is_null(&self) -> bool {
        self.writer.is_none()
    }
}

/// Initialize the global audit logger against syslog.
///
/// Returns an error if syslog is unreachable or if already initialized.
pub fn init_logger() -> Result<(), TelemetryError> {
    install(AuditLogger::new()?)
}

/// Initialize the global audit logger as a null logger.
pub fn init_null_logger() -> Result<(), TelemetryError> {
    install(AuditLogger::new_null())
}

fn install(logger: AuditLogger) -> Result<(), TelemetryError> {
    AUDIT_LOGGER
        .set(logger)
        .map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Get a reference to the global audit logger.
///
/// # Panics
///
/// Panics if no logger was initialized.
pub fn audit() -> &'static AuditLogger {
    AUDIT_LOGGER
        .get()
        .expect("Audit logger not initialized - call init_logger() first")
}

/// Try to get a reference to the global audit logger.
pub fn try_audit() -> Option<&'static AuditLogger> {
    AUDIT_LOGGER.get()
}

/// Log an event if a global logger is installed; otherwise drop it.
///
/// Library code uses this so embedders and tests need no setup.
pub fn record(event: AuditEvent) {
    match try_audit() {
        Some(logger) => logger.log(event),
        None => debug!("Audit logger not initialized, dropping {:?}", event),
    }
}
