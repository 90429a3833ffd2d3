//! AppSync 실시간 클라이언트 (연결 오케스트레이터).
//!
//! 하나의 물리 연결 위에 여러 논리 구독을 다중화합니다.
//!
//! # 연결 상태
//!
//! ```text
//! None ──connect──> Connecting ──connection_ack──> Connected
//!                        │                             │
//!                        └──timeout/error──> Disconnected
//!                                                      │
//!           transport disconnected ──> ConnectionDropped ──transport connected──> Connecting
//!           disconnect() ──> Disconnecting ──> Disconnected
//! ```
//!
//! # 라우팅
//!
//! - `connection_ack`: `Connected` 전이, heartbeat 감시 시작, 기존 구독 재개
//! - `ka`: heartbeat 신호
//! - 그 외: 연결 단위 broadcast 채널로 전달 (구독별 ID 필터링)

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use appsync_core::config::{ConnectionConfig, RealtimeConfig, RetryConfig};

use crate::auth::{interceptor_from_config, AuthInterceptor, IamSigning};
use crate::endpoint::realtime_url;
use crate::error::{RealtimeError, RealtimeResult};
use crate::protocol::{GraphQLRequest, RealtimeRequest, RealtimeResponse, ResponseType};
use crate::retry::with_retry_if;
use crate::subscription::{AppSyncSubscription, SubscriptionState};
use crate::traits::{RequestSender, WebSocketEvent, WebSocketTransport};
use crate::websocket::TungsteniteTransport;

// ============================================================================
// 공개 타입
// ============================================================================

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 생성됨
    None,
    /// 핸드셰이크 진행 중
    Connecting,
    /// `connection_ack` 수신
    Connected,
    /// 전송 계층 연결 유실 (의도하지 않은 종료)
    ConnectionDropped,
    /// `disconnect()` 진행 중
    Disconnecting,
    /// 종료됨
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::None => "none",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ConnectionDropped => "connection_dropped",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// 연결 단위 이벤트.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// 서버 응답 (`connection_ack`, `ka` 제외)
    Response(RealtimeResponse),
    /// 연결 단위 실패 (모든 구독에 전달)
    Failure(RealtimeError),
}

/// 호출자에게 전달되는 구독 이벤트.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// `start` 전송됨
    Subscribing,
    /// `start_ack` 수신
    Subscribed,
    /// 구독 종료
    Unsubscribed,
    /// 구독 데이터
    Data(Value),
    /// 구독/연결 에러
    Error(RealtimeError),
}

/// 구독 이벤트 스트림.
///
/// 구독이 해제되고 모든 송신 측이 정리되면 종료됩니다.
#[derive(Debug)]
pub struct SubscriptionStream {
    id: String,
    rx: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl SubscriptionStream {
    /// 구독 ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 다음 이벤트 수신.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        self.rx.recv().await
    }
}

impl Stream for SubscriptionStream {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// 내부 상태
// ============================================================================

struct SubscriptionEntry {
    subscription: Arc<AppSyncSubscription>,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
    forwarder: CancellationToken,
}

#[derive(Default)]
struct ClientState {
    subscriptions: HashMap<String, SubscriptionEntry>,
    heartbeat: Option<JoinHandle<()>>,
}

struct ClientInner {
    self_ref: Weak<ClientInner>,
    endpoint: Url,
    transport: Arc<dyn WebSocketTransport>,
    interceptor: Option<Arc<dyn AuthInterceptor>>,
    config: ConnectionConfig,
    retry: RetryConfig,
    connection: watch::Sender<ConnectionState>,
    responses: broadcast::Sender<ConnectionEvent>,
    heartbeat: Arc<Notify>,
    init_sent: AtomicBool,
    state: Mutex<ClientState>,
}

/// AppSync 실시간 클라이언트.
///
/// 복제 가능한 핸들이며, 마지막 핸들이 해제되면 리스너를 정리하고 소켓을 닫습니다.
#[derive(Clone)]
pub struct AppSyncRealtimeClient {
    inner: Arc<ClientInner>,
}

impl AppSyncRealtimeClient {
    /// 새 클라이언트 생성.
    ///
    /// tokio 런타임 안에서 호출해야 합니다 (전송 계층 이벤트 루프를 시작함).
    pub fn new(
        endpoint: Url,
        transport: Arc<dyn WebSocketTransport>,
        interceptor: Option<Arc<dyn AuthInterceptor>>,
        config: ConnectionConfig,
        retry: RetryConfig,
    ) -> Self {
        let (connection, _) = watch::channel(ConnectionState::None);
        let (responses, _) = broadcast::channel(config.event_buffer.max(1));
        let transport_events = transport.events();

        let inner = Arc::new_cyclic(|self_ref| ClientInner {
            self_ref: self_ref.clone(),
            endpoint,
            transport,
            interceptor,
            config,
            retry,
            connection,
            responses,
            heartbeat: Arc::new(Notify::new()),
            init_sent: AtomicBool::new(false),
            state: Mutex::new(ClientState::default()),
        });

        tokio::spawn(ClientInner::run_event_loop(
            Arc::downgrade(&inner),
            transport_events,
        ));

        Self { inner }
    }

    /// 설정에서 클라이언트를 생성합니다.
    ///
    /// 실시간 URL 계산, 인증 데코레이터, tungstenite 전송 계층을 구성합니다.
    /// IAM 모드는 `iam`이 필요합니다.
    pub fn from_config(config: &RealtimeConfig, iam: Option<IamSigning>) -> RealtimeResult<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;
        let url = realtime_url(&endpoint)?;
        let interceptor = interceptor_from_config(&config.auth, &config.region, iam)?;

        info!(
            endpoint = %endpoint,
            realtime = %url,
            auth = config.auth.mode_name(),
            "Creating realtime client"
        );

        let transport = Arc::new(TungsteniteTransport::new(
            url,
            endpoint.clone(),
            Some(interceptor.clone()),
            config.retry.clone(),
            config.connection.event_buffer,
        ));

        Ok(Self::new(
            endpoint,
            transport,
            Some(interceptor),
            config.connection.clone(),
            config.retry.clone(),
        ))
    }

    /// 현재 연결 상태.
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    /// 연결 여부.
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// 연결 상태 변경 구독.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// 연결 단위 이벤트 구독.
    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.responses.subscribe()
    }

    /// 등록된 구독 ID 목록.
    pub async fn subscription_ids(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state.subscriptions.keys().cloned().collect()
    }

    /// 구독 상태 조회.
    pub async fn subscription_state(&self, id: &str) -> Option<SubscriptionState> {
        let subscription = {
            let state = self.inner.state.lock().await;
            state.subscriptions.get(id).map(|e| e.subscription.clone())
        }?;
        Some(subscription.state().await)
    }

    /// 연결 수립.
    ///
    /// 이미 `Connecting`/`Connected`면 no-op이고, `Disconnecting`이면 `Disconnected`를
    /// 기다린 뒤 진행합니다. `connection_ack`를 받지 못하면 실패하고 상태를 되돌립니다.
    pub async fn connect(&self) -> RealtimeResult<()> {
        self.inner.connect().await
    }

    /// 연결 종료. 구독 목록은 유지되어 재연결 시 재개됩니다.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await
    }

    /// 구독이 하나도 없을 때만 연결을 종료합니다.
    pub async fn disconnect_when_idle(&self) {
        let idle = self.inner.state.lock().await.subscriptions.is_empty();
        if idle {
            debug!("No active subscriptions, disconnecting");
            self.inner.disconnect().await;
        } else {
            debug!("Subscriptions still active, keeping connection");
        }
    }

    /// 지정한 상태가 될 때까지 대기합니다.
    pub async fn wait_for_state(&self, target: ConnectionState) -> RealtimeResult<()> {
        self.inner.wait_for_state(target).await
    }

    /// GraphQL 요청으로 구독합니다.
    pub async fn subscribe_graphql(
        &self,
        id: impl Into<String>,
        request: &GraphQLRequest,
    ) -> RealtimeResult<SubscriptionStream> {
        let data = request.to_data()?;
        self.subscribe(id, data).await
    }

    /// 구독 등록.
    ///
    /// 스트림을 즉시 반환하고, 연결 수립과 `start` 전송은 백그라운드에서 진행합니다.
    /// 이후 실패는 스트림의 `Error` 이벤트로 전달됩니다.
    ///
    /// `query`는 `start` payload의 `data`로 보낼 JSON 문자열입니다.
    /// 같은 ID가 이미 등록되어 있으면 `DuplicateSubscription`을 반환합니다.
    pub async fn subscribe(
        &self,
        id: impl Into<String>,
        query: impl Into<String>,
    ) -> RealtimeResult<SubscriptionStream> {
        let id = id.into();
        let query = query.into();
        if query.trim().is_empty() {
            return Err(RealtimeError::InvalidRequest(
                "subscription query must not be empty".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let subscription = {
            let mut state = self.inner.state.lock().await;
            if state.subscriptions.contains_key(&id) {
                warn!(subscription_id = %id, "Subscription id already registered");
                return Err(RealtimeError::DuplicateSubscription(id));
            }

            let sender: Weak<dyn RequestSender> = self.inner.self_ref.clone();
            let subscription = Arc::new(AppSyncSubscription::new(
                id.clone(),
                query,
                sender,
                self.inner.retry.clone(),
            ));

            let forwarder = CancellationToken::new();
            tokio::spawn(forward_events(
                subscription.clone(),
                subscription.state_changes(),
                self.inner.responses.subscribe(),
                events_tx.clone(),
                forwarder.clone(),
            ));

            state.subscriptions.insert(
                id.clone(),
                SubscriptionEntry {
                    subscription: subscription.clone(),
                    events: events_tx.clone(),
                    forwarder,
                },
            );
            subscription
        };
        debug!(subscription_id = %id, "Subscription registered");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let was_connected = inner.state() == ConnectionState::Connected;
            if let Err(e) = inner.connect().await {
                // connect()가 실패를 모든 구독에 broadcast함
                debug!(subscription_id = %subscription.id(), error = %e, "Deferred connect failed");
                return;
            }
            // 새로 연결한 경우에는 connection_ack 처리에서 재개됨
            if !was_connected || inner.state() != ConnectionState::Connected {
                return;
            }
            if let Err(e) = subscription.subscribe().await {
                if !matches!(e, RealtimeError::Cancelled(_)) {
                    let _ = events_tx.send(SubscriptionEvent::Error(e));
                }
            }
        });

        Ok(SubscriptionStream { id, rx: events_rx })
    }

    /// 구독 해제.
    ///
    /// 등록되지 않은 ID면 no-op입니다. 성공/실패와 관계없이 목록에서 제거합니다.
    pub async fn unsubscribe(&self, id: &str) -> RealtimeResult<()> {
        let entry = self.inner.state.lock().await.subscriptions.remove(id);
        let Some(entry) = entry else {
            debug!(subscription_id = %id, "Unsubscribe for unknown id ignored");
            return Ok(());
        };

        entry.subscription.cancel();
        let result = entry.subscription.unsubscribe().await;
        if let Err(e) = &result {
            let _ = entry.events.send(SubscriptionEvent::Error(e.clone()));
        }
        // 연결 유실/실패 상태에서 제거된 구독도 Unsubscribed로 마감
        entry.subscription.close().await;
        entry.forwarder.cancel();
        info!(subscription_id = %id, "Subscription removed");
        result
    }
}

impl fmt::Debug for AppSyncRealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSyncRealtimeClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// 연결 수명주기
// ============================================================================

impl ClientInner {
    fn state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.connection.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn broadcast(&self, event: ConnectionEvent) {
        let _ = self.responses.send(event);
    }

    async fn wait_for_state(&self, target: ConnectionState) -> RealtimeResult<()> {
        let mut rx = self.connection.subscribe();
        let timeout = self.config.state_wait_timeout();
        // watch::Ref가 rx를 빌리므로 future 안에서 해제
        let reached = async { rx.wait_for(|s| *s == target).await.map(|_| ()) };
        let outcome = tokio::time::timeout(timeout, reached).await;
        match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(RealtimeError::ClientClosed),
            Err(_) => Err(RealtimeError::Timeout(format!(
                "state `{}` not reached within {}ms",
                target,
                timeout.as_millis()
            ))),
        }
    }

    async fn connect(self: &Arc<Self>) -> RealtimeResult<()> {
        loop {
            let current = self.state();
            match current {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    debug!(state = %current, "Already connecting or connected");
                    return Ok(());
                }
                ConnectionState::Disconnecting => {
                    if let Err(e) = self.wait_for_state(ConnectionState::Disconnected).await {
                        warn!(error = %e, "Gave up waiting for disconnect to finish");
                        self.broadcast(ConnectionEvent::Failure(e.clone()));
                        return Err(e);
                    }
                    continue;
                }
                _ => {}
            }

            let claimed = self.connection.send_if_modified(|s| {
                if *s == current {
                    *s = ConnectionState::Connecting;
                    true
                } else {
                    false
                }
            });
            if claimed {
                break;
            }
        }

        info!("Connecting");
        match self.handshake().await {
            Ok(()) => {
                info!("Connected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Connect failed");
                self.init_sent.store(false, Ordering::SeqCst);
                self.set_state(ConnectionState::Disconnected);
                self.transport.disconnect().await;
                self.broadcast(ConnectionEvent::Failure(e.clone()));
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> RealtimeResult<()> {
        let retry = if self.config.auto_retry {
            self.retry.clone()
        } else {
            RetryConfig::no_retry()
        };
        // 재시도는 여기서만 수행
        with_retry_if(&retry, "transport_connect", RealtimeError::is_transport, || {
            self.transport.connect(self.config.auto_reconnect, false)
        })
        .await?;

        let mut responses = self.responses.subscribe();
        let mut states = self.connection.subscribe();
        self.init_sent.store(true, Ordering::SeqCst);
        self.write(&RealtimeRequest::ConnectionInit).await?;

        let init = RealtimeRequest::ConnectionInit;
        let wait_ack = async {
            loop {
                tokio::select! {
                    event = responses.recv() => match event {
                        Ok(ConnectionEvent::Response(response)) if init.is_answered_by(&response) => {
                            return match response.error() {
                                Some(e) => Err(e),
                                None => Ok(()),
                            };
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Response listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(RealtimeError::ClientClosed);
                        }
                    },
                    changed = states.changed() => {
                        let state = *states.borrow_and_update();
                        if changed.is_err() {
                            return Err(RealtimeError::ClientClosed);
                        }
                        if state != ConnectionState::Connecting && state != ConnectionState::Connected {
                            return Err(RealtimeError::Disconnected(format!(
                                "connection {} during handshake",
                                state
                            )));
                        }
                    }
                }
            }
        };

        let timeout = self.config.ack_timeout();
        tokio::time::timeout(timeout, wait_ack).await.map_err(|_| {
            RealtimeError::Timeout(format!(
                "connection_ack not received within {}ms",
                timeout.as_millis()
            ))
        })?
    }

    async fn disconnect(&self) {
        let proceed = self.connection.send_if_modified(|s| {
            if *s == ConnectionState::Disconnecting {
                false
            } else {
                *s = ConnectionState::Disconnecting;
                true
            }
        });
        if !proceed {
            debug!("Already disconnecting");
            return;
        }

        info!("Disconnecting");
        self.init_sent.store(false, Ordering::SeqCst);
        self.stop_heartbeat().await;
        self.mark_connection_lost().await;
        self.transport.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected");
    }

    async fn write(&self, request: &RealtimeRequest) -> RealtimeResult<()> {
        let frame = request.encode()?;
        // 인증 정보가 포함될 수 있으므로 타입과 ID만 기록
        debug!(kind = request.kind(), id = ?request.id(), "Writing frame");
        self.transport.write(frame).await
    }

    /// 재개 대상 표시. 활성 구독을 `None`으로 되돌립니다.
    async fn mark_connection_lost(&self) {
        let subscriptions: Vec<_> = {
            let state = self.state.lock().await;
            state
                .subscriptions
                .values()
                .map(|e| e.subscription.clone())
                .collect()
        };
        for subscription in subscriptions {
            subscription.mark_connection_lost().await;
        }
    }

    /// 목록의 모든 구독을 재개합니다.
    async fn resume_subscriptions(&self) {
        let entries: Vec<_> = {
            let state = self.state.lock().await;
            state
                .subscriptions
                .values()
                .map(|e| (e.subscription.clone(), e.events.clone()))
                .collect()
        };
        if entries.is_empty() {
            return;
        }

        info!(count = entries.len(), "Resuming subscriptions");
        for (subscription, events) in entries {
            if let Err(e) = subscription.resume().await {
                if !matches!(e, RealtimeError::Cancelled(_)) {
                    warn!(subscription_id = %subscription.id(), error = %e, "Failed to resume subscription");
                    let _ = events.send(SubscriptionEvent::Error(e));
                }
            }
        }
    }

    // ========================================================================
    // heartbeat
    // ========================================================================

    async fn start_heartbeat(self: &Arc<Self>, connection_timeout_ms: Option<u64>) {
        let timeout_ms = match connection_timeout_ms {
            Some(ms) if ms > 0 => ms,
            _ => self.config.default_keep_alive_ms,
        };
        debug!(timeout_ms, "Starting heartbeat monitor");

        let window = Duration::from_millis(timeout_ms);
        let notify = self.heartbeat.clone();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = notify.notified() => continue,
                    _ = tokio::time::sleep(window) => break,
                }
            }

            warn!(timeout_ms, "Keep-alive timed out, reconnecting");
            let Some(inner) = weak.upgrade() else { return };
            // 감시 태스크 자신이 abort되므로 분리된 태스크에서 재연결
            tokio::spawn(async move {
                inner.disconnect().await;
                if let Err(e) = inner.connect().await {
                    warn!(error = %e, "Reconnect after keep-alive timeout failed");
                }
            });
        });

        let mut state = self.state.lock().await;
        if let Some(previous) = state.heartbeat.replace(handle) {
            previous.abort();
        }
    }

    async fn stop_heartbeat(&self) {
        if let Some(handle) = self.state.lock().await.heartbeat.take() {
            handle.abort();
        }
    }

    // ========================================================================
    // 이벤트 루프
    // ========================================================================

    async fn run_event_loop(weak: Weak<Self>, mut events: broadcast::Receiver<WebSocketEvent>) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Transport event listener lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(inner) = weak.upgrade() else { break };
            inner.on_transport_event(event).await;
        }
        debug!("Transport event loop finished");
    }

    async fn on_transport_event(self: &Arc<Self>, event: WebSocketEvent) {
        match event {
            WebSocketEvent::Connected => {
                if self.state() == ConnectionState::ConnectionDropped {
                    info!("Transport reconnected, restarting handshake");
                    let inner = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = inner.connect().await {
                            warn!(error = %e, "Reconnect handshake failed");
                        }
                    });
                }
            }
            WebSocketEvent::Disconnected { code, reason } => {
                // 이전 소켓의 종료 이벤트가 새 핸드셰이크를 끊지 않도록,
                // Connecting 중에는 전송 계층이 실제로 끊겼을 때만 유실로 처리
                let socket_down = !self.transport.is_connected();
                let dropped = self.connection.send_if_modified(|s| match *s {
                    ConnectionState::Connected => {
                        *s = ConnectionState::ConnectionDropped;
                        true
                    }
                    ConnectionState::Connecting if socket_down => {
                        *s = ConnectionState::ConnectionDropped;
                        true
                    }
                    _ => false,
                });
                if dropped {
                    warn!(?code, ?reason, "Connection dropped");
                    self.init_sent.store(false, Ordering::SeqCst);
                    self.stop_heartbeat().await;
                    self.mark_connection_lost().await;
                } else {
                    debug!(?code, state = %self.state(), "Ignoring stale transport disconnect");
                }
            }
            WebSocketEvent::Error(message) => {
                warn!(error = %message, "Transport error");
                // 전송 계층이 재연결을 포기한 경우
                let gave_up = !self.transport.is_connected()
                    && self.connection.send_if_modified(|s| {
                        if *s == ConnectionState::ConnectionDropped {
                            *s = ConnectionState::Disconnected;
                            true
                        } else {
                            false
                        }
                    });
                if gave_up {
                    warn!("Transport stopped reconnecting, connection closed");
                }
                self.broadcast(ConnectionEvent::Failure(RealtimeError::Transport(message)));
            }
            WebSocketEvent::Text(text) => match RealtimeResponse::decode(&text) {
                Ok(response) => self.on_response(response).await,
                Err(e) => debug!(error = %e, "Dropping undecodable text frame"),
            },
            WebSocketEvent::Binary(data) => match RealtimeResponse::decode_bytes(&data) {
                Ok(response) => self.on_response(response).await,
                Err(e) => debug!(error = %e, "Dropping undecodable binary frame"),
            },
        }
    }

    async fn on_response(self: &Arc<Self>, response: RealtimeResponse) {
        match response.response_type {
            ResponseType::ConnectionAck => {
                if !self.init_sent.load(Ordering::SeqCst)
                    || self.state() != ConnectionState::Connecting
                {
                    debug!(state = %self.state(), "Ignoring unsolicited connection_ack");
                    return;
                }
                self.set_state(ConnectionState::Connected);
                self.start_heartbeat(response.connection_timeout_ms()).await;

                let inner = self.clone();
                tokio::spawn(async move { inner.resume_subscriptions().await });

                self.broadcast(ConnectionEvent::Response(response));
            }
            ResponseType::KeepAlive => self.heartbeat.notify_one(),
            ResponseType::Unknown => debug!(id = ?response.id, "Ignoring frame with unknown type"),
            _ => self.broadcast(ConnectionEvent::Response(response)),
        }
    }
}

#[async_trait]
impl RequestSender for ClientInner {
    async fn send_request(&self, request: RealtimeRequest) -> RealtimeResult<()> {
        if self.state() != ConnectionState::Connected {
            return Err(RealtimeError::Disconnected(format!(
                "cannot send {} while {}",
                request.kind(),
                self.state()
            )));
        }

        let request = match &self.interceptor {
            Some(interceptor) => interceptor.intercept_request(request, &self.endpoint).await?,
            None => request,
        };

        // 빠른 응답을 놓치지 않도록 전송 전에 리스너 등록
        let mut responses = self.responses.subscribe();
        let mut states = self.connection.subscribe();
        self.write(&request).await?;

        let wait = async {
            loop {
                tokio::select! {
                    event = responses.recv() => match event {
                        Ok(ConnectionEvent::Response(response)) if request.is_answered_by(&response) => {
                            return match response.error() {
                                Some(e) => Err(e),
                                None => Ok(()),
                            };
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Response listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(RealtimeError::ClientClosed);
                        }
                    },
                    changed = states.changed() => {
                        let state = *states.borrow_and_update();
                        if changed.is_err() {
                            return Err(RealtimeError::ClientClosed);
                        }
                        if state != ConnectionState::Connected {
                            return Err(RealtimeError::Disconnected(format!(
                                "connection {} while waiting for response",
                                state
                            )));
                        }
                    }
                }
            }
        };

        let timeout = self.config.request_timeout();
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            RealtimeError::Timeout(format!(
                "no response to {} {:?} within {}ms",
                request.kind(),
                request.id(),
                timeout.as_millis()
            ))
        })?
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(handle) = state.heartbeat.take() {
            handle.abort();
        }
        for (_, entry) in state.subscriptions.drain() {
            entry.subscription.cancel();
            entry.forwarder.cancel();
        }

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let transport = self.transport.clone();
            runtime.spawn(async move { transport.disconnect().await });
        }
    }
}

// ============================================================================
// 구독별 이벤트 전달
// ============================================================================

/// 구독 상태 전이와 연결 단위 응답을 호출자 이벤트로 변환합니다.
async fn forward_events(
    subscription: Arc<AppSyncSubscription>,
    mut states: broadcast::Receiver<SubscriptionState>,
    mut responses: broadcast::Receiver<ConnectionEvent>,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;

            state = states.recv() => match state {
                Ok(SubscriptionState::Subscribing) => Some(SubscriptionEvent::Subscribing),
                Ok(SubscriptionState::Subscribed) => Some(SubscriptionEvent::Subscribed),
                Ok(SubscriptionState::Unsubscribed) => {
                    let _ = events.send(SubscriptionEvent::Unsubscribed);
                    break;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => None,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            response = responses.recv() => match response {
                Ok(ConnectionEvent::Response(response)) => {
                    translate_response(&subscription, response).await
                }
                Ok(ConnectionEvent::Failure(e)) => Some(SubscriptionEvent::Error(e)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(subscription_id = %subscription.id(), skipped = n, "Subscription listener lagged");
                    None
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = cancel.cancelled() => break,
        };

        if let Some(event) = event {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    debug!(subscription_id = %subscription.id(), "Subscription forwarder finished");
}

async fn translate_response(
    subscription: &AppSyncSubscription,
    response: RealtimeResponse,
) -> Option<SubscriptionEvent> {
    match response.id.as_deref() {
        Some(id) if id == subscription.id() => match response.response_type {
            ResponseType::Data => Some(SubscriptionEvent::Data(
                response.payload.unwrap_or(Value::Null),
            )),
            ResponseType::Error => {
                // start 응답 에러는 subscribe() 결과로 전달됨
                if subscription.state().await == SubscriptionState::Subscribed {
                    response.error().map(SubscriptionEvent::Error)
                } else {
                    None
                }
            }
            _ => None,
        },
        None if response.response_type == ResponseType::ConnectionError => {
            response.error().map(SubscriptionEvent::Error)
        }
        _ => None,
    }
}
