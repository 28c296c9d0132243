//! 应用层错误定义
//!
//! 统一的协调器错误类型

use thiserror::Error;

/// 应用层错误
///
/// 异步作业的失败（状态码、超时）不走这里——它们是被建模的状态；
/// 这里只承载提交时的即时失败与无效操作
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 状态无效
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 外部服务错误
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<crate::application::ports::ServiceError> for ApplicationError {
    fn from(err: crate::application::ports::ServiceError) -> Self {
        Self::ExternalServiceError(err.to_string())
    }
}
