//! AppSync 실시간 프로토콜 메시지 코덱.
//!
//! `graphql-ws` 기반 JSON 엔벨로프를 인코딩/디코딩합니다.
//!
//! # 메시지 흐름
//!
//! ```text
//! client ── connection_init ──> server
//! client <── connection_ack ─── server   (payload.connectionTimeoutMs)
//! client ── start{id} ────────> server
//! client <── start_ack{id} ──── server
//! client <── data{id} / ka ──── server
//! client ── stop{id} ─────────> server
//! client <── complete{id} ───── server
//! ```

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::auth::AuthHeader;
use crate::error::{RealtimeError, RealtimeResult};

const LIMIT_EXCEEDED_ERROR: &str = "LimitExceededError";
const MAX_SUBSCRIPTIONS_REACHED_ERROR: &str = "MaxSubscriptionsReachedError";
const UNAUTHORIZED_ERROR: &str = "Unauthorized";

// ============================================================================
// 아웃바운드 요청
// ============================================================================

/// `start` 요청 내용.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    /// 구독 ID (응답 상관관계에 사용)
    pub id: String,
    /// GraphQL 요청 JSON 문자열 (`{"query":..., "variables":...}`)
    pub data: String,
    /// 인증 헤더 (인증 데코레이터가 채움)
    pub auth: Option<AuthHeader>,
}

/// 클라이언트에서 서버로 보내는 요청.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeRequest {
    /// 핸드셰이크 시작
    ConnectionInit,
    /// 구독 시작
    Start(StartRequest),
    /// 구독 종료
    Stop(String),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum WireRequest<'a> {
    #[serde(rename = "connection_init")]
    ConnectionInit,
    #[serde(rename = "start")]
    Start { id: &'a str, payload: StartPayload<'a> },
    #[serde(rename = "stop")]
    Stop { id: &'a str },
}

#[derive(Serialize)]
struct StartPayload<'a> {
    data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<Extensions<'a>>,
}

#[derive(Serialize)]
struct Extensions<'a> {
    authorization: &'a AuthHeader,
}

impl Serialize for RealtimeRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            RealtimeRequest::ConnectionInit => WireRequest::ConnectionInit,
            RealtimeRequest::Start(start) => WireRequest::Start {
                id: &start.id,
                payload: StartPayload {
                    data: &start.data,
                    extensions: start
                        .auth
                        .as_ref()
                        .map(|authorization| Extensions { authorization }),
                },
            },
            RealtimeRequest::Stop(id) => WireRequest::Stop { id },
        };
        wire.serialize(serializer)
    }
}

impl RealtimeRequest {
    /// 구독 시작 요청 생성 (인증 헤더 없음).
    pub fn start(id: impl Into<String>, data: impl Into<String>) -> Self {
        RealtimeRequest::Start(StartRequest {
            id: id.into(),
            data: data.into(),
            auth: None,
        })
    }

    /// 구독 종료 요청 생성.
    pub fn stop(id: impl Into<String>) -> Self {
        RealtimeRequest::Stop(id.into())
    }

    /// 요청 ID 반환 (`connection_init`은 없음).
    pub fn id(&self) -> Option<&str> {
        match self {
            RealtimeRequest::ConnectionInit => None,
            RealtimeRequest::Start(start) => Some(&start.id),
            RealtimeRequest::Stop(id) => Some(id),
        }
    }

    /// 와이어 타입 이름 반환.
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeRequest::ConnectionInit => "connection_init",
            RealtimeRequest::Start(_) => "start",
            RealtimeRequest::Stop(_) => "stop",
        }
    }

    /// JSON 텍스트 프레임으로 인코딩.
    pub fn encode(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 이 요청에 대한 응답인지 확인.
    ///
    /// 도착 순서가 아니라 ID와 타입만으로 상관관계를 판단합니다.
    pub fn is_answered_by(&self, response: &RealtimeResponse) -> bool {
        match self {
            RealtimeRequest::ConnectionInit => {
                response.id.is_none()
                    && matches!(
                        response.response_type,
                        ResponseType::ConnectionAck | ResponseType::ConnectionError
                    )
            }
            RealtimeRequest::Start(start) => {
                response.id.as_deref() == Some(start.id.as_str())
                    && matches!(
                        response.response_type,
                        ResponseType::StartAck | ResponseType::Error
                    )
            }
            RealtimeRequest::Stop(id) => {
                response.id.as_deref() == Some(id.as_str())
                    && matches!(
                        response.response_type,
                        ResponseType::Complete | ResponseType::Error
                    )
            }
        }
    }
}

// ============================================================================
// 인바운드 응답
// ============================================================================

/// 서버 이벤트 타입.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ResponseType {
    /// 핸드셰이크 완료
    #[serde(rename = "connection_ack")]
    ConnectionAck,
    /// 구독 수락
    #[serde(rename = "start_ack")]
    StartAck,
    /// 구독 종료 확인
    #[serde(rename = "complete", alias = "stop_ack")]
    Complete,
    /// 구독 데이터
    #[serde(rename = "data")]
    Data,
    /// 구독 단위 에러
    #[serde(rename = "error")]
    Error,
    /// 연결 단위 에러
    #[serde(rename = "connection_error")]
    ConnectionError,
    /// heartbeat
    #[serde(rename = "ka")]
    KeepAlive,
    /// 알 수 없는 타입 (무시됨)
    #[default]
    #[serde(other)]
    Unknown,
}

/// 서버에서 받은 응답 엔벨로프.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RealtimeResponse {
    /// 구독 ID (연결 단위 응답은 없음)
    #[serde(default)]
    pub id: Option<String>,
    /// 응답 payload
    #[serde(default)]
    pub payload: Option<Value>,
    /// 응답 타입
    #[serde(rename = "type", default)]
    pub response_type: ResponseType,
}

impl RealtimeResponse {
    /// 텍스트 프레임 디코딩.
    pub fn decode(text: &str) -> RealtimeResult<Self> {
        serde_json::from_str(text).map_err(|e| RealtimeError::Decode(e.to_string()))
    }

    /// 바이너리 프레임 디코딩.
    pub fn decode_bytes(bytes: &[u8]) -> RealtimeResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| RealtimeError::Decode(e.to_string()))
    }

    /// 연결 단위 응답인지 확인.
    pub fn is_connection_scoped(&self) -> bool {
        self.id.is_none()
    }

    /// `connection_ack`의 `connectionTimeoutMs` 값.
    pub fn connection_timeout_ms(&self) -> Option<u64> {
        self.payload
            .as_ref()?
            .get("connectionTimeoutMs")
            .and_then(Value::as_u64)
    }

    /// 에러 응답을 분류된 에러로 변환.
    ///
    /// 에러 응답이 아니면 `None`.
    pub fn error(&self) -> Option<RealtimeError> {
        match self.response_type {
            ResponseType::Error | ResponseType::ConnectionError => {
                Some(classify_error(self.payload.as_ref()))
            }
            _ => None,
        }
    }
}

/// 서버 에러 payload의 `errors[].errorType`을 분류합니다.
///
/// 부분 문자열 매칭으로 판단하며, 분류되지 않으면 원본 payload를 보존한
/// `Unknown`을 반환합니다.
pub fn classify_error(payload: Option<&Value>) -> RealtimeError {
    let entries: Vec<&Value> = match payload.and_then(|p| p.get("errors")) {
        Some(Value::Array(errors)) => errors.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    };

    for entry in &entries {
        let error_type = entry
            .get("errorType")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if error_type.contains(LIMIT_EXCEEDED_ERROR) {
            return RealtimeError::LimitExceeded;
        }
        if error_type.contains(MAX_SUBSCRIPTIONS_REACHED_ERROR) {
            return RealtimeError::MaxSubscriptionsReached;
        }
        if error_type.contains(UNAUTHORIZED_ERROR) {
            return RealtimeError::Unauthorized;
        }
    }

    let first = entries.first();
    let message = first
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("Failed to get subscription response")
        .to_string();
    let cause = first
        .and_then(|e| e.get("errorType"))
        .and_then(Value::as_str)
        .map(str::to_string);

    RealtimeError::Unknown {
        message,
        cause,
        payload: payload.cloned(),
    }
}

// ============================================================================
// GraphQL 요청
// ============================================================================

/// `start` payload의 `data` 필드로 직렬화되는 GraphQL 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    /// GraphQL 문서
    pub query: String,
    /// 변수
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl GraphQLRequest {
    /// 새 요청 생성.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
        }
    }

    /// 변수 설정.
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// 요청 검증.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.query.trim().is_empty() {
            return Err(RealtimeError::InvalidRequest(
                "GraphQL document must not be empty".to_string(),
            ));
        }
        if let Some(variables) = &self.variables {
            if !variables.is_object() {
                return Err(RealtimeError::InvalidRequest(
                    "GraphQL variables must be a JSON object".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `start` payload에 들어갈 JSON 문자열로 변환.
    pub fn to_data(&self) -> RealtimeResult<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_connection_init() {
        let encoded = RealtimeRequest::ConnectionInit.encode().unwrap();
        assert_eq!(encoded, r#"{"type":"connection_init"}"#);
    }

    #[test]
    fn test_encode_stop() {
        let encoded = RealtimeRequest::stop("sub-1").encode().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, json!({"type": "stop", "id": "sub-1"}));
    }

    #[test]
    fn test_encode_start_with_authorization() {
        let request = RealtimeRequest::Start(StartRequest {
            id: "sub-1".to_string(),
            data: r#"{"query":"subscription { onCreate { id } }"}"#.to_string(),
            auth: Some(AuthHeader::api_key(
                "example.com",
                "20240101T000000Z",
                "da2-key",
            )),
        });

        let value: Value = serde_json::from_str(&request.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "start");
        assert_eq!(value["id"], "sub-1");
        assert_eq!(
            value["payload"]["data"],
            r#"{"query":"subscription { onCreate { id } }"}"#
        );
        assert_eq!(
            value["payload"]["extensions"]["authorization"],
            json!({
                "host": "example.com",
                "x-amz-date": "20240101T000000Z",
                "x-api-key": "da2-key"
            })
        );
    }

    #[test]
    fn test_encode_start_without_authorization_omits_extensions() {
        let request = RealtimeRequest::start("sub-1", "{}");
        let value: Value = serde_json::from_str(&request.encode().unwrap()).unwrap();
        assert!(value["payload"].get("extensions").is_none());
    }

    #[test]
    fn test_decode_known_types() {
        let ack = RealtimeResponse::decode(
            r#"{"type":"connection_ack","payload":{"connectionTimeoutMs":300000}}"#,
        )
        .unwrap();
        assert_eq!(ack.response_type, ResponseType::ConnectionAck);
        assert!(ack.is_connection_scoped());
        assert_eq!(ack.connection_timeout_ms(), Some(300_000));

        let data = RealtimeResponse::decode(
            r#"{"type":"data","id":"a","payload":{"data":{"onCreate":{"id":"1"}}}}"#,
        )
        .unwrap();
        assert_eq!(data.response_type, ResponseType::Data);
        assert_eq!(data.id.as_deref(), Some("a"));

        let complete = RealtimeResponse::decode(r#"{"type":"complete","id":"a"}"#).unwrap();
        assert_eq!(complete.response_type, ResponseType::Complete);

        let ka = RealtimeResponse::decode_bytes(br#"{"type":"ka"}"#).unwrap();
        assert_eq!(ka.response_type, ResponseType::KeepAlive);
    }

    #[test]
    fn test_decode_unknown_or_missing_type_is_not_an_error() {
        let unknown = RealtimeResponse::decode(r#"{"type":"brand_new","id":"x"}"#).unwrap();
        assert_eq!(unknown.response_type, ResponseType::Unknown);

        let missing = RealtimeResponse::decode(r#"{"id":"x"}"#).unwrap();
        assert_eq!(missing.response_type, ResponseType::Unknown);
    }

    #[test]
    fn test_decode_malformed_frame() {
        assert!(matches!(
            RealtimeResponse::decode("{not json"),
            Err(RealtimeError::Decode(_))
        ));
    }

    #[test]
    fn test_classify_errors() {
        let unauthorized = json!({"errors": [{"errorType": "UnauthorizedException"}]});
        assert!(matches!(
            classify_error(Some(&unauthorized)),
            RealtimeError::Unauthorized
        ));

        let limit = json!({"errors": [{"errorType": "SomeService.LimitExceededError"}]});
        assert!(matches!(
            classify_error(Some(&limit)),
            RealtimeError::LimitExceeded
        ));

        let max = json!({"errors": [{"errorType": "MaxSubscriptionsReachedError"}]});
        assert!(matches!(
            classify_error(Some(&max)),
            RealtimeError::MaxSubscriptionsReached
        ));

        let other = json!({"errors": [{"errorType": "BadRequest", "message": "nope"}]});
        match classify_error(Some(&other)) {
            RealtimeError::Unknown {
                message,
                cause,
                payload,
            } => {
                assert_eq!(message, "nope");
                assert_eq!(cause.as_deref(), Some("BadRequest"));
                assert_eq!(payload, Some(other.clone()));
            }
            e => panic!("unexpected classification: {:?}", e),
        }
    }

    #[test]
    fn test_classify_without_payload() {
        assert!(matches!(
            classify_error(None),
            RealtimeError::Unknown { payload: None, .. }
        ));
    }

    #[test]
    fn test_response_error_only_for_error_types() {
        let data = RealtimeResponse::decode(r#"{"type":"data","id":"a"}"#).unwrap();
        assert!(data.error().is_none());

        let conn_err = RealtimeResponse::decode(
            r#"{"type":"connection_error","payload":{"errors":[{"errorType":"UnauthorizedException","errorCode":401}]}}"#,
        )
        .unwrap();
        assert!(matches!(conn_err.error(), Some(RealtimeError::Unauthorized)));
    }

    #[test]
    fn test_response_correlation() {
        let start = RealtimeRequest::start("a", "{}");
        let ack_a = RealtimeResponse::decode(r#"{"type":"start_ack","id":"a"}"#).unwrap();
        let ack_b = RealtimeResponse::decode(r#"{"type":"start_ack","id":"b"}"#).unwrap();
        let data_a = RealtimeResponse::decode(r#"{"type":"data","id":"a"}"#).unwrap();
        assert!(start.is_answered_by(&ack_a));
        assert!(!start.is_answered_by(&ack_b));
        assert!(!start.is_answered_by(&data_a));

        let init = RealtimeRequest::ConnectionInit;
        let conn_ack = RealtimeResponse::decode(r#"{"type":"connection_ack"}"#).unwrap();
        assert!(init.is_answered_by(&conn_ack));
        assert!(!init.is_answered_by(&ack_a));
    }

    #[test]
    fn test_graphql_request_data() {
        let request = GraphQLRequest::new("subscription { onCreate { id } }")
            .with_variables(json!({"owner": "me"}));
        let data: Value = serde_json::from_str(&request.to_data().unwrap()).unwrap();
        assert_eq!(data["query"], "subscription { onCreate { id } }");
        assert_eq!(data["variables"]["owner"], "me");

        assert!(GraphQLRequest::new("  ").validate().is_err());
        assert!(GraphQLRequest::new("subscription { x }")
            .with_variables(json!([1, 2]))
            .validate()
            .is_err());
    }

    mod classification_props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn limit_exceeded_matches_as_substring(prefix in "[A-Za-z.]{0,12}", suffix in "[A-Za-z]{0,8}") {
                let payload = json!({"errors": [{"errorType": format!("{}LimitExceededError{}", prefix, suffix)}]});
                prop_assert!(matches!(classify_error(Some(&payload)), RealtimeError::LimitExceeded));
            }

            #[test]
            fn unrecognized_types_keep_payload(error_type in "[a-z]{1,16}") {
                let payload = json!({"errors": [{"errorType": error_type}]});
                let classified = classify_error(Some(&payload));
                let keeps_payload = matches!(&classified, RealtimeError::Unknown { payload: Some(p), .. } if *p == payload);
                prop_assert!(keeps_payload);
            }
        }
    }
}
