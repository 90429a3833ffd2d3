//! GraphQL 구독 실행.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use appsync_core::config::AuthConfig;
use appsync_realtime::{AppSyncRealtimeClient, GraphQLRequest, SubscriptionEvent};

use super::load_config;

/// 구독 실행 설정.
#[derive(Debug)]
pub struct SubscribeConfig {
    /// 설정 파일 경로
    pub config_path: String,
    /// 구독 ID
    pub id: Option<String>,
    /// GraphQL 문서 또는 `@파일경로`
    pub query: String,
    /// GraphQL 변수 (JSON)
    pub variables: Option<String>,
    /// 실행 시간 (초)
    pub duration_secs: Option<u64>,
}

/// 구독을 실행하고 이벤트를 표준 출력에 JSON 줄로 기록합니다.
///
/// Ctrl-C 또는 지정한 시간이 지나면 구독을 해제하고 유휴 연결을 닫습니다.
pub async fn run_subscribe(args: SubscribeConfig) -> Result<()> {
    let config = load_config(&args.config_path)?;

    if matches!(config.auth, AuthConfig::Iam { .. }) {
        bail!("IAM auth mode needs a SigV4 signer and is not available from the CLI");
    }

    let request = build_request(&args.query, args.variables.as_deref())?;
    request.validate()?;

    let id = args
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let client = AppSyncRealtimeClient::from_config(&config, None)?;
    let mut stream = client.subscribe_graphql(id.clone(), &request).await?;
    info!(subscription_id = %id, "Subscription started");

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = stream.recv() => {
                let Some(event) = event else {
                    warn!(subscription_id = %id, "Subscription stream closed");
                    break;
                };
                let ended = matches!(event, SubscriptionEvent::Unsubscribed);
                println!("{}", event_to_json(&id, &event));
                if ended {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = &mut deadline => {
                info!("Duration elapsed, shutting down");
                break;
            }
        }
    }

    if let Err(e) = client.unsubscribe(&id).await {
        warn!(subscription_id = %id, error = %e, "Unsubscribe failed");
    }
    client.disconnect_when_idle().await;
    Ok(())
}

/// `--query`/`--variables` 인자로 GraphQL 요청을 만듭니다.
fn build_request(query: &str, variables: Option<&str>) -> Result<GraphQLRequest> {
    let document = match query.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query file {}", path))?,
        None => query.to_string(),
    };

    let mut request = GraphQLRequest::new(document);
    if let Some(raw) = variables {
        let value: Value =
            serde_json::from_str(raw).context("--variables must be a JSON object")?;
        request = request.with_variables(value);
    }
    Ok(request)
}

/// 구독 이벤트를 출력용 JSON으로 변환합니다.
fn event_to_json(id: &str, event: &SubscriptionEvent) -> Value {
    match event {
        SubscriptionEvent::Subscribing => json!({"id": id, "event": "subscribing"}),
        SubscriptionEvent::Subscribed => json!({"id": id, "event": "subscribed"}),
        SubscriptionEvent::Unsubscribed => json!({"id": id, "event": "unsubscribed"}),
        SubscriptionEvent::Data(payload) => json!({"id": id, "event": "data", "payload": payload}),
        SubscriptionEvent::Error(e) => json!({"id": id, "event": "error", "message": e.to_string()}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appsync_realtime::RealtimeError;

    #[test]
    fn test_build_request_inline() {
        let request = build_request("subscription { onCreate { id } }", Some(r#"{"a":1}"#)).unwrap();
        let data: Value = serde_json::from_str(&request.to_data().unwrap()).unwrap();
        assert_eq!(data["query"], "subscription { onCreate { id } }");
        assert_eq!(data["variables"]["a"], 1);
    }

    #[test]
    fn test_build_request_rejects_bad_variables() {
        assert!(build_request("subscription { x }", Some("not json")).is_err());
    }

    #[test]
    fn test_build_request_missing_file() {
        assert!(build_request("@/nonexistent/query.graphql", None).is_err());
    }

    #[test]
    fn test_event_to_json() {
        let data = event_to_json("s1", &SubscriptionEvent::Data(json!({"n": 1})));
        assert_eq!(data["event"], "data");
        assert_eq!(data["payload"]["n"], 1);

        let error = event_to_json("s1", &SubscriptionEvent::Error(RealtimeError::Unauthorized));
        assert_eq!(error["message"], "Unauthorized");
    }
}
