//! Audit logging for the capability broker.
//!
//! Two separate channels:
//!
//! - **Audit** (syslog, tag `SANDBOX_BROKER`): one JSON line per
//!   human-facing decision, for SIEM ingestion. Never carries secret values.
//! - **Diagnostics** (`tracing` to stderr): everything else.
//!
//! # Usage
//!
//! ```ignore
//! use sandbox_broker::telemetry::{self, AuditEvent, Decision};
//!
//! telemetry::init_logger()?;
//!
//! telemetry::record(AuditEvent::DomainDecision {
//!     container: "agent-1".to_string(),
//!     domain: ".pypi.org".to_string(),
//!     decision: Decision::Allow,
//! });
//! ```
//!
//! # Event Format
//!
//! ```json
//! {"ts":"2026-03-02T09:12:44Z","event":"secret_read","container":"agent-1","key":"GITHUB_TOKEN","decision":"allow"}
//! ```

mod error;
mod events;
mod syslog;

pub use error::TelemetryError;
pub use events::{AuditEvent, Decision, TimestampedEvent};
pub use syslog::{AuditLogger, SYSLOG_TAG, audit, init_logger, init_null_logger, record, try_audit};
