//! Data-view session management.

pub mod error;
pub mod manager;
pub mod query_session;
pub mod state;
pub mod target;

pub use error::SessionError;
pub use manager::SessionManager;
pub use query_session::QuerySession;
pub use state::{ColumnInfo, PollStatus, QueryState, ResultSummary, RowPage, TransactionId};
pub use target::{ObjectKind, Target, ViewMode, ViewRequest, VIEW_ROWS_LIMIT};
