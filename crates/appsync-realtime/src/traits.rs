//! 전송 계층 및 요청 송신 trait 정의.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::RealtimeResult;
use crate::protocol::RealtimeRequest;

/// 전송 계층 이벤트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketEvent {
    /// 소켓 연결됨 (재연결 포함)
    Connected,
    /// 소켓 연결 끊김
    Disconnected {
        /// close 코드
        code: Option<u16>,
        /// close 사유
        reason: Option<String>,
    },
    /// 소켓 에러
    Error(String),
    /// 텍스트 프레임
    Text(String),
    /// 바이너리 프레임
    Binary(Vec<u8>),
}

/// 양방향 텍스트 메시지 전송 계층.
///
/// 실시간 클라이언트는 이 trait을 통해서만 소켓에 접근합니다.
#[async_trait]
pub trait WebSocketTransport: Send + Sync {
    /// 소켓 연결. 이미 연결되어 있으면 no-op.
    async fn connect(&self, auto_reconnect: bool, auto_retry: bool) -> RealtimeResult<()>;

    /// 소켓 종료. 자동 재연결도 중지합니다.
    async fn disconnect(&self);

    /// 텍스트 프레임 전송.
    async fn write(&self, message: String) -> RealtimeResult<()>;

    /// 연결 여부.
    fn is_connected(&self) -> bool;

    /// 이벤트 스트림 구독.
    fn events(&self) -> broadcast::Receiver<WebSocketEvent>;
}

/// 구독이 실시간 클라이언트를 통해 요청을 보내기 위한 핸들.
#[async_trait]
pub trait RequestSender: Send + Sync {
    /// 요청을 서명/전송하고 ID와 타입이 일치하는 응답을 기다립니다.
    async fn send_request(&self, request: RealtimeRequest) -> RealtimeResult<()>;
}
