//! Mediation channel between a contained agent and the broker.
//!
//! ```text
//!  container                          host
//!  ┌──────────────────┐   unix sock   ┌───────────────────────────────┐
//!  │ MediationClient  │──── line ────>│ MediationServer               │
//!  │ (internal-request)│<─── line ─────│  type ─> Handler (one at once)│
//!  └──────────────────┘               └───────────────────────────────┘
//! ```

pub mod client;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;

pub use client::{MediationClient, SOCKET_ENV_VAR, client_from_env};
pub use error::{ControlError, ControlResult};
pub use handler::{Handler, decode_payload, encode_payload};
pub use protocol::{ERROR_MESSAGE_TYPE, MessageType, Request, Response};
pub use server::{DEFAULT_READ_TIMEOUT, MAX_LINE_SIZE, MediationServer};
