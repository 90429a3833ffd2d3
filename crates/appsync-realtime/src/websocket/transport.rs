//! tokio-tungstenite 기반 전송 계층.
//!
//! 연결마다 두 개의 태스크를 띄웁니다:
//! - writer: mpsc 큐에서 프레임을 꺼내 소켓에 기록
//! - reader: 수신 프레임을 [`WebSocketEvent`]로 변환해 broadcast 채널에 게시
//!
//! 예기치 않은 종료 후 `auto_reconnect`가 켜져 있으면 jitter 백오프로 재연결하고
//! `Connected` 이벤트를 다시 게시합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use appsync_core::config::RetryConfig;

use crate::auth::AuthInterceptor;
use crate::error::{RealtimeError, RealtimeResult};
use crate::retry::{backoff_delay, with_retry_if};
use crate::traits::{WebSocketEvent, WebSocketTransport};

/// AppSync가 요구하는 WebSocket 서브 프로토콜.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// 활성 연결 핸들.
struct Session {
    writer: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

struct TransportInner {
    url: Url,
    endpoint: Url,
    interceptor: Option<Arc<dyn AuthInterceptor>>,
    retry: RetryConfig,
    events: broadcast::Sender<WebSocketEvent>,
    connected: AtomicBool,
    auto_reconnect: AtomicBool,
    auto_retry: AtomicBool,
    session: Mutex<Option<Session>>,
}

/// tokio-tungstenite 기반 [`WebSocketTransport`].
#[derive(Clone)]
pub struct TungsteniteTransport {
    inner: Arc<TransportInner>,
}

impl TungsteniteTransport {
    /// 새 전송 계층 생성.
    ///
    /// - `url`: 실시간 WebSocket URL
    /// - `endpoint`: 인증 헤더 계산에 쓰는 GraphQL 엔드포인트
    pub fn new(
        url: Url,
        endpoint: Url,
        interceptor: Option<Arc<dyn AuthInterceptor>>,
        retry: RetryConfig,
        event_buffer: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            inner: Arc::new(TransportInner {
                url,
                endpoint,
                interceptor,
                retry,
                events,
                connected: AtomicBool::new(false),
                auto_reconnect: AtomicBool::new(false),
                auto_retry: AtomicBool::new(false),
                session: Mutex::new(None),
            }),
        }
    }

    /// 실시간 URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }
}

impl TransportInner {
    fn publish(&self, event: WebSocketEvent) {
        // 수신자가 없으면 버림
        let _ = self.events.send(event);
    }

    async fn connection_url(&self) -> RealtimeResult<Url> {
        match &self.interceptor {
            Some(interceptor) => {
                interceptor
                    .intercept_connection(&self.url, &self.endpoint)
                    .await
            }
            None => Ok(self.url.clone()),
        }
    }

    /// 소켓을 열고 reader/writer 태스크를 시작합니다.
    async fn open(self: &Arc<Self>) -> RealtimeResult<()> {
        let url = self.connection_url().await?;
        let mut request = url.as_str().into_client_request()?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(GRAPHQL_WS_PROTOCOL),
        );

        info!(host = ?self.url.host_str(), path = %self.url.path(), "Connecting to realtime endpoint");
        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
        let cancel = CancellationToken::new();

        {
            let mut session = self.session.lock().await;
            if let Some(previous) = session.take() {
                previous.cancel.cancel();
            }
            *session = Some(Session {
                writer: writer_tx,
                cancel: cancel.clone(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);

        // writer
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => {
                        let close = Message::Close(Some(CloseFrame {
                            code: CloseCode::Away,
                            reason: "".into(),
                        }));
                        let _ = write.send(close).await;
                        break;
                    }
                    msg = writer_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            warn!(error = %e, "Failed to write frame");
                            break;
                        }
                    }
                }
            }
        });

        // reader
        let weak = Arc::downgrade(self);
        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut code = None;
            let mut reason = None;
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    msg = read.next() => {
                        let Some(inner) = weak.upgrade() else { return };
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                inner.publish(WebSocketEvent::Text(text));
                            }
                            Some(Ok(Message::Binary(data))) => {
                                inner.publish(WebSocketEvent::Binary(data));
                            }
                            Some(Ok(Message::Close(frame))) => {
                                if let Some(frame) = frame {
                                    code = Some(u16::from(frame.code));
                                    reason = Some(frame.reason.into_owned());
                                }
                                warn!(?code, ?reason, "Server closed the connection");
                                break;
                            }
                            Some(Ok(_)) => {
                                // Ping/Pong은 tungstenite가 처리
                            }
                            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => break,
                            Some(Err(e)) => {
                                error!(error = %e, "WebSocket receive error");
                                inner.publish(WebSocketEvent::Error(e.to_string()));
                                break;
                            }
                            None => {
                                warn!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                }
            }

            if reader_cancel.is_cancelled() {
                return;
            }
            reader_cancel.cancel();

            let Some(inner) = weak.upgrade() else { return };
            inner.connected.store(false, Ordering::SeqCst);
            inner.publish(WebSocketEvent::Disconnected { code, reason });

            if inner.auto_reconnect.load(Ordering::SeqCst) {
                drop(inner);
                TransportInner::reconnect(weak).await;
            }
        });

        info!("Realtime WebSocket connected");
        self.publish(WebSocketEvent::Connected);
        Ok(())
    }

    /// 예기치 않은 종료 후 jitter 백오프로 재연결합니다.
    ///
    /// 재시도 가능한 에러만 `max_retries`까지 재시도하며, 최종 실패는
    /// `Error` 이벤트로 게시하고 자동 재연결을 끕니다.
    fn reconnect(weak: Weak<Self>) -> BoxFuture<'static, ()> {
        async move {
            let retry = match weak.upgrade() {
                Some(inner) if inner.auto_reconnect.load(Ordering::SeqCst) => inner.retry.clone(),
                _ => return,
            };
            tokio::time::sleep(backoff_delay(&retry, 0)).await;

            let result = with_retry_if(
                &retry,
                "websocket_reconnect",
                RealtimeError::is_retryable,
                || {
                    let weak = weak.clone();
                    async move {
                        let inner = weak.upgrade().ok_or(RealtimeError::ClientClosed)?;
                        if !inner.auto_reconnect.load(Ordering::SeqCst) {
                            return Err(RealtimeError::Cancelled("reconnect".to_string()));
                        }
                        if inner.connected.load(Ordering::SeqCst) {
                            return Ok(());
                        }
                        inner.open().await
                    }
                },
            )
            .await;

            match result {
                Ok(()) => info!("Reconnected"),
                Err(RealtimeError::Cancelled(_) | RealtimeError::ClientClosed) => {
                    debug!("Reconnect abandoned");
                }
                Err(e) => {
                    error!(error = %e, "Reconnect failed, giving up");
                    if let Some(inner) = weak.upgrade() {
                        inner.auto_reconnect.store(false, Ordering::SeqCst);
                        inner.publish(WebSocketEvent::Error(format!("reconnect failed: {}", e)));
                    }
                }
            }
        }
        .boxed()
    }
}

#[async_trait]
impl WebSocketTransport for TungsteniteTransport {
    async fn connect(&self, auto_reconnect: bool, auto_retry: bool) -> RealtimeResult<()> {
        if self.is_connected() {
            debug!("Transport already connected");
            return Ok(());
        }
        self.inner.auto_reconnect.store(auto_reconnect, Ordering::SeqCst);
        self.inner.auto_retry.store(auto_retry, Ordering::SeqCst);

        let retry = if auto_retry {
            self.inner.retry.clone()
        } else {
            RetryConfig::no_retry()
        };
        let inner = &self.inner;
        with_retry_if(&retry, "websocket_connect", RealtimeError::is_transport, || {
            inner.open()
        })
        .await
    }

    async fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);
        self.inner.auto_retry.store(false, Ordering::SeqCst);

        let session = self.inner.session.lock().await.take();
        if let Some(session) = session {
            session.cancel.cancel();
            self.inner.connected.store(false, Ordering::SeqCst);
            self.inner.publish(WebSocketEvent::Disconnected {
                code: Some(u16::from(CloseCode::Away)),
                reason: None,
            });
            info!("Realtime WebSocket disconnected");
        }
    }

    async fn write(&self, message: String) -> RealtimeResult<()> {
        let session = self.inner.session.lock().await;
        let session = session
            .as_ref()
            .filter(|_| self.inner.connected.load(Ordering::SeqCst))
            .ok_or_else(|| RealtimeError::Disconnected("socket is not connected".to_string()))?;
        session
            .writer
            .send(Message::Text(message))
            .map_err(|_| RealtimeError::Disconnected("writer task stopped".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<WebSocketEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::auth::{AuthHeader, SignTarget};
    use std::sync::atomic::AtomicUsize;

    fn transport() -> TungsteniteTransport {
        transport_with(None, RetryConfig::no_retry())
    }

    fn transport_with(
        interceptor: Option<Arc<dyn AuthInterceptor>>,
        retry: RetryConfig,
    ) -> TungsteniteTransport {
        TungsteniteTransport::new(
            Url::parse("ws://127.0.0.1:9/graphql/realtime").unwrap(),
            Url::parse("http://127.0.0.1:9/graphql").unwrap(),
            interceptor,
            retry,
            16,
        )
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    /// 서명에 항상 실패하는 데코레이터.
    #[derive(Default)]
    struct FailingInterceptor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthInterceptor for FailingInterceptor {
        fn mode_name(&self) -> &'static str {
            "failing"
        }

        async fn auth_header(
            &self,
            _endpoint: &Url,
            _body: &str,
            _target: SignTarget,
        ) -> RealtimeResult<AuthHeader> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RealtimeError::Signing("credentials expired".to_string()))
        }
    }

    #[tokio::test]
    async fn test_write_before_connect_fails() {
        let transport = transport();
        assert!(!transport.is_connected());
        let result = transport.write("{}".to_string()).await;
        assert!(matches!(result, Err(RealtimeError::Disconnected(_))));
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let transport = transport();
        let result = transport.connect(false, false).await;
        assert!(result.unwrap_err().is_transport());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_stops_on_signing_error() {
        let interceptor = Arc::new(FailingInterceptor::default());
        let transport = transport_with(Some(interceptor.clone()), fast_retry(5));
        transport.inner.auto_reconnect.store(true, Ordering::SeqCst);
        let mut events = transport.events();

        TransportInner::reconnect(Arc::downgrade(&transport.inner)).await;

        // 서명 에러는 재시도하지 않음
        assert_eq!(interceptor.calls.load(Ordering::SeqCst), 1);
        match events.try_recv() {
            Ok(WebSocketEvent::Error(message)) => assert!(message.contains("credentials expired")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert!(!transport.inner.auto_reconnect.load(Ordering::SeqCst));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_max_retries() {
        let transport = transport_with(None, fast_retry(2));
        transport.inner.auto_reconnect.store(true, Ordering::SeqCst);
        let mut events = transport.events();

        tokio::time::timeout(
            std::time::Duration::from_secs(10),
            TransportInner::reconnect(Arc::downgrade(&transport.inner)),
        )
        .await
        .expect("reconnect loop must be bounded");

        assert!(matches!(events.try_recv(), Ok(WebSocketEvent::Error(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_skipped_after_disconnect() {
        let interceptor = Arc::new(FailingInterceptor::default());
        let transport = transport_with(Some(interceptor.clone()), fast_retry(5));
        let mut events = transport.events();

        // disconnect()가 자동 재연결을 끈 상태
        TransportInner::reconnect(Arc::downgrade(&transport.inner)).await;

        assert_eq!(interceptor.calls.load(Ordering::SeqCst), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let transport = transport();
        let mut events = transport.events();
        transport.disconnect().await;
        assert!(events.try_recv().is_err());
    }
}
