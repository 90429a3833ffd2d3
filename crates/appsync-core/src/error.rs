//! 설정 및 공통 에러 타입.
//!
//! 이 모듈은 설정 로드와 검증 단계에서 발생하는 에러를 정의합니다.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 로드 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 설정 값 검증 실패
    #[error("잘못된 설정 값 `{field}`: {reason}")]
    InvalidField {
        /// 문제가 된 설정 키
        field: &'static str,
        /// 실패 사유
        reason: String,
    },

    /// 로깅 초기화 에러
    #[error("로깅 에러: {0}")]
    Logging(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

/// 핵심 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// 검증 에러를 생성합니다.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// 사용자 입력(설정 파일)을 고쳐야 하는 에러인지 확인합니다.
    pub fn is_user_error(&self) -> bool {
        matches!(self, CoreError::Config(_) | CoreError::InvalidField { .. })
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_message() {
        let err = CoreError::invalid("endpoint", "must not be empty");
        assert_eq!(
            err.to_string(),
            "잘못된 설정 값 `endpoint`: must not be empty"
        );
        assert!(err.is_user_error());
    }

    #[test]
    fn test_logging_error_is_not_user_error() {
        let err = CoreError::Logging("already initialized".to_string());
        assert!(!err.is_user_error());
    }
}
