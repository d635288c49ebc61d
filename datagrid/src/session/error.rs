use thiserror::Error;

use super::TransactionId;

/// Query session 过程中的错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 目标对象无法解析
    #[error("Could not find the object: {0}")]
    InvalidTarget(String),

    /// 会话不存在（已关闭或从未创建）
    #[error("Transaction ID {0} not found in the session")]
    UnknownSession(TransactionId),

    /// 协议顺序错误，例如重复 start
    #[error("Transaction ID {id} is {actual}, expected {expected}")]
    InvalidState {
        id: TransactionId,
        actual: &'static str,
        expected: &'static str,
    },

    #[error("Transaction ID {0} is already in use")]
    DuplicateSession(TransactionId),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// 无法获取数据库连接
    #[error("Could not connect to the database: {0}")]
    Connection(#[source] db_driver::Error),
}

impl SessionError {
    /// Classify a driver error raised while resolving a target.
    pub(crate) fn from_connect(err: db_driver::Error) -> Self {
        if err.is_not_found() {
            SessionError::InvalidTarget(err.to_string())
        } else {
            SessionError::Connection(err)
        }
    }
}
