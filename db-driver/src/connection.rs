//! Connector traits for database access.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::types::{DatabaseRef, Ddl, Oid, RelationInfo, Result, Row, SelectQuery, TriggerInfo};

/// Connection unique identifier
pub type ConnectionId = Uuid;

/// Stream of row batches produced by [`Connection::query`].
pub type RowBatchStream<'a> = Pin<Box<dyn Stream<Item = Result<Vec<Row>>> + Send + 'a>>;

/// Opens connections to databases.
///
/// Implementations decide how connections are pooled; callers only promise to
/// hand every connection back through [`Connection::close`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to the database at `db`.
    ///
    /// Fails with a not-found error (see [`crate::Error::is_not_found`]) when
    /// any segment of the path does not exist, or with
    /// [`crate::Error::ConnectionFailed`] when the server cannot be reached.
    async fn connect(&self, db: DatabaseRef) -> Result<Box<dyn Connection>>;
}

/// An open connection to one database.
///
/// A connection is used by one owner at a time and is never shared between
/// sessions.
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Database this connection is bound to.
    fn database(&self) -> DatabaseRef;

    /// Describe a relation by oid.
    async fn relation(&self, oid: Oid) -> Result<RelationInfo>;

    /// Describe a trigger on a table.
    async fn trigger(&self, table_oid: Oid, trigger_oid: Oid) -> Result<TriggerInfo>;

    /// Run a query, yielding rows in batches of at most `batch_size`.
    ///
    /// The stream can be dropped between batches to abandon the query.
    fn query(&self, query: SelectQuery, batch_size: usize) -> RowBatchStream<'_>;

    /// Apply statements as one unit: either all of them take effect or none.
    async fn execute(&self, statements: &[Ddl]) -> Result<()>;

    /// Release the connection.
    async fn close(self: Box<Self>);
}
