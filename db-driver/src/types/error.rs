//! Driver error type.

use thiserror::Error;

use super::ids::{DatabaseId, Oid, ServerGroupId, ServerId};

#[derive(Debug, Error)]
pub enum Error {
    /// 服务器组不存在
    #[error("Server group {0} not found")]
    ServerGroupNotFound(ServerGroupId),

    /// 服务器不存在
    #[error("Server {0} not found")]
    ServerNotFound(ServerId),

    /// 数据库不存在
    #[error("Database {0} not found")]
    DatabaseNotFound(DatabaseId),

    #[error("Schema \"{0}\" does not exist")]
    SchemaNotFound(String),

    #[error("Could not find the object {0}")]
    ObjectNotFound(Oid),

    /// 无法建立连接
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("column \"{0}\" does not exist")]
    UndefinedColumn(String),

    #[error("{0} already exists")]
    DuplicateObject(String),

    /// 语句执行失败
    #[error("{0}")]
    Execution(String),
}

impl Error {
    /// True when the error means some part of an object path did not resolve.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ServerGroupNotFound(_)
                | Error::ServerNotFound(_)
                | Error::DatabaseNotFound(_)
                | Error::SchemaNotFound(_)
                | Error::ObjectNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
