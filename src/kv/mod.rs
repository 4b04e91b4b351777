//! Unprotected key-value scratch space for agents.

mod backend;
mod error;
mod file;
mod handlers;

pub use backend::{KvBackend, KvStore};
pub use error::{KvError, KvResult};
pub use file::FileKv;
pub use handlers::{KvDeleteHandler, KvGetHandler, KvListHandler, KvService, KvSetHandler};
