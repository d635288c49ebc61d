pub mod config;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod handler;
pub mod objects;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use envelope::JsonEnvelope;
pub use error::{ApiError, Result};
pub use server::{create_app, AppState};
pub use session::{SessionError, SessionManager, TransactionId};
