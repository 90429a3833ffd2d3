//! WebSocket 전송 계층 구현.
//!
//! `tokio-tungstenite` 기반 [`TungsteniteTransport`]를 제공합니다.

mod transport;

pub use transport::{TungsteniteTransport, GRAPHQL_WS_PROTOCOL};
