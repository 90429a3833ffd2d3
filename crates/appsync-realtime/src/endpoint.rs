//! 실시간 엔드포인트 URL 해석.

use url::Url;

use crate::error::{RealtimeError, RealtimeResult};

const AWS_HOST_SUFFIX: &str = "amazonaws.com";
const API_HOST_LABEL: &str = "appsync-api";
const REALTIME_HOST_LABEL: &str = "appsync-realtime-api";
const CUSTOM_DOMAIN_PATH: &str = "realtime";

/// GraphQL 엔드포인트에서 WebSocket 실시간 엔드포인트를 계산합니다.
///
/// - `*.amazonaws.com`: 호스트의 `appsync-api`를 `appsync-realtime-api`로 치환
/// - 커스텀 도메인: 경로 끝에 `/realtime` 추가
///
/// 이후 스킴을 `http → ws`, `https → wss`로 변환합니다.
pub fn realtime_url(endpoint: &Url) -> RealtimeResult<Url> {
    let host = endpoint
        .host_str()
        .ok_or_else(|| RealtimeError::InvalidRequest("endpoint has no host".to_string()))?;

    let mut url = endpoint.clone();
    if host.ends_with(AWS_HOST_SUFFIX) {
        let realtime_host = host.replace(API_HOST_LABEL, REALTIME_HOST_LABEL);
        url.set_host(Some(&realtime_host))?;
    } else {
        url.path_segments_mut()
            .map_err(|_| RealtimeError::InvalidRequest("endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .push(CUSTOM_DOMAIN_PATH);
    }

    let scheme = match endpoint.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url),
        other => {
            return Err(RealtimeError::InvalidRequest(format!(
                "unsupported endpoint scheme `{}`",
                other
            )))
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        RealtimeError::InvalidRequest(format!("cannot convert scheme to `{}`", scheme))
    })?;

    Ok(url)
}

/// 인증 헤더의 `host` 값.
///
/// 실시간 호스트가 아니라 GraphQL 엔드포인트 호스트를 사용합니다.
pub fn auth_host(endpoint: &Url) -> RealtimeResult<String> {
    let host = endpoint
        .host_str()
        .ok_or_else(|| RealtimeError::InvalidRequest("endpoint has no host".to_string()))?;

    Ok(match endpoint.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
