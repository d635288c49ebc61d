//! Database driver for the datagrid console.
//!
//! This crate provides the connection service the console talks to: typed
//! catalog identifiers, structured statements that render to SQL text, and a
//! [`Connector`]/[`Connection`] pair that sessions use to reach a database.
//!
//! # Features
//!
//! - **Typed addressing**: server groups, servers, databases and objects are
//!   distinct identifier types
//! - **Structured statements**: [`SelectQuery`] and [`Ddl`] are data first and
//!   render to SQL for logging and display
//! - **Streaming**: query results arrive as a stream of row batches so callers
//!   can stop between batches
//! - **In-memory backend**: [`MemoryCluster`] implements the connector traits
//!   over a small catalog model
//!
//! # Example
//!
//! ```rust,no_run
//! use db_driver::{Column, Connector, DatabaseRef, MemoryCluster, ServerGroupId, ServerId};
//!
//! # async fn example() -> db_driver::Result<()> {
//! let cluster = MemoryCluster::seeded();
//! let database = cluster.database_id(ServerGroupId(1), ServerId(1), "postgres")?;
//! let db = DatabaseRef::new(ServerGroupId(1), ServerId(1), database);
//! let oid = cluster.create_table(
//!     db,
//!     "public",
//!     "accounts",
//!     vec![Column::new("id", "integer").not_null()],
//!     vec!["id".to_string()],
//! )?;
//!
//! let conn = cluster.connect(db).await?;
//! let relation = conn.relation(oid).await?;
//! println!("{}", relation.name);
//! conn.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`types`] - Identifiers, catalog descriptions, statements and errors
//! - [`connection`] - The connector traits
//! - [`memory`] - In-memory cluster backend

pub mod connection;
mod internal;
pub mod memory;
pub mod types;

pub use connection::{Connection, ConnectionId, Connector, RowBatchStream};
pub use memory::MemoryCluster;
pub use types::*;
