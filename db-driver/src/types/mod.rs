//! Type definitions for the database driver.

pub mod catalog;
pub mod ddl;
pub mod error;
pub mod ids;
pub mod query;

// Re-export commonly used types
pub use catalog::{
    Column, QualifiedName, RelationInfo, RelationKind, RelOptions, Row, TriggerInfo, TriggerMode,
};
pub use ddl::{CommentTarget, Ddl};
pub use error::{Error, Result};
pub use ids::{DatabaseId, DatabaseRef, Oid, SchemaId, ServerGroupId, ServerId};
pub use query::{Operator, OrderBy, Predicate, SelectQuery};
