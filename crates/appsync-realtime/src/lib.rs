//! AppSync 실시간 GraphQL 구독 클라이언트.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 와이어 프로토콜 코덱 (`connection_init`, `start`, `stop` 및 서버 응답)
//! - 인증 데코레이터 (API 키, Bearer 토큰, IAM)
//! - 구독 단위 상태 머신
//! - 연결 오케스트레이터: 핸드셰이크, heartbeat 감시, 재연결, 구독 재개
//! - tokio-tungstenite 기반 WebSocket 전송 계층
//!
//! # 사용 예
//!
//! ```no_run
//! use appsync_core::config::RealtimeConfig;
//! use appsync_realtime::{AppSyncRealtimeClient, GraphQLRequest, SubscriptionEvent};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RealtimeConfig::load("config/realtime.toml")?;
//! let client = AppSyncRealtimeClient::from_config(&config, None)?;
//!
//! let request = GraphQLRequest::new("subscription OnCreate { onCreateTodo { id name } }");
//! let mut stream = client.subscribe_graphql("todos", &request).await?;
//! while let Some(event) = stream.recv().await {
//!     if let SubscriptionEvent::Data(payload) = event {
//!         println!("{}", payload);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod subscription;
pub mod traits;
pub mod websocket;

pub use auth::{
    interceptor_from_config, ApiKeyAuthInterceptor, AuthHeader, AuthInterceptor, AwsCredentials,
    BearerAuthInterceptor, CredentialsProvider, IamAuthHeader, IamAuthInterceptor, IamSigning,
    SigV4Signer, SigningRequest, StaticTokenProvider, TokenProvider,
};
pub use client::{
    AppSyncRealtimeClient, ConnectionEvent, ConnectionState, SubscriptionEvent, SubscriptionStream,
};
pub use endpoint::{auth_host, realtime_url};
pub use error::*;
pub use protocol::{
    classify_error, GraphQLRequest, RealtimeRequest, RealtimeResponse, ResponseType, StartRequest,
};
pub use retry::{backoff_delay, with_retry_if};
pub use subscription::{AppSyncSubscription, SubscriptionState};
pub use traits::*;
pub use websocket::{TungsteniteTransport, GRAPHQL_WS_PROTOCOL};
