//! 실시간 클라이언트 에러 타입.

use serde_json::Value;
use thiserror::Error;

/// 실시간 구독 관련 에러.
///
/// 하나의 연결 에러를 모든 구독 스트림에 전달할 수 있도록 `Clone`을 구현합니다.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    /// 전송 계층 에러 (소켓 에러, 연결 유실)
    #[error("Transport error: {0}")]
    Transport(String),

    /// 연결되지 않은 상태에서 요청
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 응답/상태 대기 시간 초과
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 요청 한도 초과 (`LimitExceededError`)
    #[error("Limit exceeded")]
    LimitExceeded,

    /// 연결당 최대 구독 수 도달 (`MaxSubscriptionsReachedError`)
    #[error("Max subscriptions reached")]
    MaxSubscriptionsReached,

    /// 인증/권한 에러
    #[error("Unauthorized")]
    Unauthorized,

    /// 분류되지 않은 서버 에러 (원본 payload 보존)
    #[error("Unknown error: {message}")]
    Unknown {
        /// 에러 메시지
        message: String,
        /// 원인 (서버 `errorType` 등)
        cause: Option<String>,
        /// 서버가 보낸 원본 payload
        payload: Option<Value>,
    },

    /// 요청 서명 실패 (자격증명/토큰 조회 실패 포함)
    #[error("Signing error: {0}")]
    Signing(String),

    /// 인바운드 프레임 디코딩 실패
    #[error("Decode error: {0}")]
    Decode(String),

    /// 잘못된 요청 (빈 쿼리, 잘못된 URL 등)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 같은 ID의 구독이 이미 활성 상태
    #[error("Duplicate subscription: {0}")]
    DuplicateSubscription(String),

    /// 진행 중인 구독이 구독 해제로 취소됨
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// 클라이언트가 이미 해제됨
    #[error("Client closed")]
    ClientClosed,
}

/// 실시간 작업을 위한 Result 타입.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

impl RealtimeError {
    /// 분류되지 않은 에러 생성.
    pub fn unknown(message: impl Into<String>) -> Self {
        RealtimeError::Unknown {
            message: message.into(),
            cause: None,
            payload: None,
        }
    }

    /// 전송 계층 실패로 취급해야 하는 에러인지 확인.
    ///
    /// 타임아웃은 재시도 판단에서 전송 실패와 동일하게 취급합니다.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RealtimeError::Transport(_) | RealtimeError::Disconnected(_) | RealtimeError::Timeout(_)
        )
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        self.is_transport() || matches!(self, RealtimeError::MaxSubscriptionsReached)
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                RealtimeError::Disconnected(err.to_string())
            }
            _ => RealtimeError::Transport(err.to_string()),
        }
    }
}

impl From<url::ParseError> for RealtimeError {
    fn from(err: url::ParseError) -> Self {
        RealtimeError::InvalidRequest(format!("invalid url: {}", err))
    }
}

impl From<appsync_core::CoreError> for RealtimeError {
    fn from(err: appsync_core::CoreError) -> Self {
        RealtimeError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(RealtimeError::Timeout("ack".to_string()).is_transport());
        assert!(RealtimeError::Transport("reset".to_string()).is_retryable());
        assert!(!RealtimeError::Unauthorized.is_transport());
        assert!(!RealtimeError::Signing("no credentials".to_string()).is_retryable());
    }

    #[test]
    fn test_max_subscriptions_is_retryable_but_not_transport() {
        let err = RealtimeError::MaxSubscriptionsReached;
        assert!(err.is_retryable());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_unknown_keeps_message() {
        let err = RealtimeError::unknown("boom");
        assert_eq!(err.to_string(), "Unknown error: boom");
    }
}
