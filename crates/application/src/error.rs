use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::connection::ConnectionError;

/// 应用层错误。本子系统中没有任何错误对进程是致命的。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    /// 存储写入/查询失败：记录日志并告知调用方，不阻塞实时转发
    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),
    /// 传输层错误：只触发在线状态清理
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }
}
