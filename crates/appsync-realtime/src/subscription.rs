//! 구독 단위 상태 머신.
//!
//! ```text
//! None ──subscribe──> Subscribing ──start_ack──> Subscribed
//!                          │                          │
//!                          └──error──> Failure        └──unsubscribe──> Unsubscribing ──complete──> Unsubscribed
//!                                                                            │
//!                                                                            └──error──> Failure
//! ```
//!
//! 상태 전이는 broadcast 채널로 게시되며, 실시간 클라이언트가 이를 호출자에게
//! 보이는 구독 이벤트로 변환합니다.

use std::sync::Weak;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use appsync_core::config::RetryConfig;
use appsync_core::subscription_span;

use crate::error::{RealtimeError, RealtimeResult};
use crate::protocol::RealtimeRequest;
use crate::retry::backoff_delay;
use crate::traits::RequestSender;

const STATE_CHANNEL_CAPACITY: usize = 16;

/// 구독 생명주기 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// 생성됨
    None,
    /// `start` 전송 후 응답 대기
    Subscribing,
    /// `start_ack` 수신
    Subscribed,
    /// `stop` 전송 후 응답 대기
    Unsubscribing,
    /// 종료됨
    Unsubscribed,
    /// 이번 시도 실패 (재구독 가능)
    Failure,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubscriptionState::None => "none",
            SubscriptionState::Subscribing => "subscribing",
            SubscriptionState::Subscribed => "subscribed",
            SubscriptionState::Unsubscribing => "unsubscribing",
            SubscriptionState::Unsubscribed => "unsubscribed",
            SubscriptionState::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// 하나의 논리 구독.
///
/// 실시간 클라이언트에 대한 약한 참조만 가지며, 모든 프레임은 클라이언트의
/// [`RequestSender`]를 통해 전송됩니다.
pub struct AppSyncSubscription {
    id: String,
    data: String,
    state: Mutex<SubscriptionState>,
    states: broadcast::Sender<SubscriptionState>,
    sender: Weak<dyn RequestSender>,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for AppSyncSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSyncSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl AppSyncSubscription {
    /// 새 구독 생성.
    ///
    /// `data`는 `start` payload에 들어갈 GraphQL 요청 JSON 문자열입니다.
    pub fn new(
        id: impl Into<String>,
        data: impl Into<String>,
        sender: Weak<dyn RequestSender>,
        retry: RetryConfig,
    ) -> Self {
        let (states, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            id: id.into(),
            data: data.into(),
            state: Mutex::new(SubscriptionState::None),
            states,
            sender,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// 구독 ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// GraphQL 요청 JSON 문자열.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// 현재 상태.
    pub async fn state(&self) -> SubscriptionState {
        *self.state.lock().await
    }

    /// 상태 전이 스트림 구독.
    pub fn state_changes(&self) -> broadcast::Receiver<SubscriptionState> {
        self.states.subscribe()
    }

    /// 진행 중인 구독 시도를 취소합니다.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 취소 여부.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn publish(&self, state: SubscriptionState) {
        let _ = self.states.send(state);
    }

    async fn transition_from(&self, from: SubscriptionState, to: SubscriptionState) -> bool {
        let mut state = self.state.lock().await;
        if *state != from {
            debug!(subscription_id = %self.id, state = %*state, expected = %from, "Skipped stale transition");
            return false;
        }
        *state = to;
        drop(state);
        debug!(subscription_id = %self.id, state = %to, "Subscription state changed");
        self.publish(to);
        true
    }

    async fn send(&self, request: RealtimeRequest) -> RealtimeResult<()> {
        let sender = self.sender.upgrade().ok_or(RealtimeError::ClientClosed)?;
        sender.send_request(request).await
    }

    /// 구독 시작.
    ///
    /// 이미 `Subscribing`/`Subscribed`면 no-op입니다. `MaxSubscriptionsReached`에
    /// 대해서만 jitter 백오프로 재시도하며, 취소되면 `Cancelled`를 반환합니다.
    pub async fn subscribe(&self) -> RealtimeResult<()> {
        {
            let mut state = self.state.lock().await;
            if matches!(
                *state,
                SubscriptionState::Subscribing | SubscriptionState::Subscribed
            ) {
                debug!(subscription_id = %self.id, state = %*state, "Subscribe ignored");
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(RealtimeError::Cancelled(self.id.clone()));
            }
            *state = SubscriptionState::Subscribing;
        }
        self.publish(SubscriptionState::Subscribing);

        let span = subscription_span!("subscribe", self.id);
        self.start_with_retry().instrument(span).await
    }

    async fn start_with_retry(&self) -> RealtimeResult<()> {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return self.abort(false).await;
            }

            let request = RealtimeRequest::start(self.id.clone(), self.data.clone());
            match self.send(request).await {
                Ok(()) => {
                    if self.cancel.is_cancelled() {
                        return self.abort(true).await;
                    }
                    self.transition_from(SubscriptionState::Subscribing, SubscriptionState::Subscribed)
                        .await;
                    return Ok(());
                }
                Err(RealtimeError::MaxSubscriptionsReached) if attempt < self.retry.max_retries => {
                    let delay = backoff_delay(&self.retry, attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Max subscriptions reached, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Subscribe failed");
                    self.transition_from(SubscriptionState::Subscribing, SubscriptionState::Failure)
                        .await;
                    return Err(e);
                }
            }
        }
    }

    /// 취소된 구독 시도 정리. 이미 시작됐으면 `stop`을 시도합니다.
    async fn abort(&self, started: bool) -> RealtimeResult<()> {
        debug!(started, "Subscribe cancelled");
        if started {
            if let Err(e) = self.send(RealtimeRequest::stop(self.id.clone())).await {
                debug!(error = %e, "Failed to stop cancelled subscription");
            }
        }
        self.transition_from(SubscriptionState::Subscribing, SubscriptionState::Unsubscribed)
            .await;
        Err(RealtimeError::Cancelled(self.id.clone()))
    }

    /// 구독 종료. `Subscribed`가 아니면 no-op입니다.
    pub async fn unsubscribe(&self) -> RealtimeResult<()> {
        {
            let mut state = self.state.lock().await;
            if *state != SubscriptionState::Subscribed {
                debug!(subscription_id = %self.id, state = %*state, "Unsubscribe ignored");
                return Ok(());
            }
            *state = SubscriptionState::Unsubscribing;
        }
        self.publish(SubscriptionState::Unsubscribing);

        match self.send(RealtimeRequest::stop(self.id.clone())).await {
            Ok(()) => {
                self.transition_from(
                    SubscriptionState::Unsubscribing,
                    SubscriptionState::Unsubscribed,
                )
                .await;
                Ok(())
            }
            Err(e) => {
                warn!(subscription_id = %self.id, error = %e, "Unsubscribe failed");
                self.transition_from(SubscriptionState::Unsubscribing, SubscriptionState::Failure)
                    .await;
                Err(e)
            }
        }
    }

    /// 연결 유실 표시. `Subscribed`를 `None`으로 되돌려 재개 대상으로 만듭니다.
    ///
    /// 상태 이벤트는 게시하지 않습니다.
    pub async fn mark_connection_lost(&self) -> bool {
        let mut state = self.state.lock().await;
        if *state == SubscriptionState::Subscribed {
            *state = SubscriptionState::None;
            return true;
        }
        false
    }

    /// 목록에서 제거된 구독 마감.
    ///
    /// `None`/`Failure` 상태면 `stop` 없이 `Unsubscribed`로 전이하고 게시합니다.
    pub async fn close(&self) -> bool {
        let mut state = self.state.lock().await;
        if !matches!(*state, SubscriptionState::None | SubscriptionState::Failure) {
            return false;
        }
        *state = SubscriptionState::Unsubscribed;
        drop(state);
        debug!(subscription_id = %self.id, "Subscription closed without stop");
        self.publish(SubscriptionState::Unsubscribed);
        true
    }

    /// 재연결 후 구독 재개.
    ///
    /// `None`/`Failure` 상태만 새 `start`를 보내고 나머지는 no-op입니다.
    pub async fn resume(&self) -> RealtimeResult<()> {
        let state = *self.state.lock().await;
        match state {
            SubscriptionState::None | SubscriptionState::Failure => self.subscribe().await,
            _ => Ok(()),
        }
    }
}
