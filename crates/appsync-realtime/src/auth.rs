//! 인증 데코레이터.
//!
//! 처리 기능:
//! - API 키 (`x-api-key` + `x-amz-date`)
//! - Bearer 토큰 (User Pools / OIDC / Lambda 인가자)
//! - IAM (SigV4 서명은 외부 [`SigV4Signer`]에 위임)
//!
//! 핸드셰이크 URL에는 base64 인코딩된 `header`/`payload` 쿼리 파라미터를,
//! `start` 요청에는 `payload.extensions.authorization` 객체를 붙입니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use appsync_core::config::AuthConfig;

use crate::endpoint::auth_host;
use crate::error::{RealtimeError, RealtimeResult};
use crate::protocol::{RealtimeRequest, StartRequest};

/// `x-amz-date` 형식 (ISO 8601 basic).
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

const IAM_ACCEPT: &str = "application/json, text/javascript";
const IAM_CONTENT_ENCODING: &str = "amz-1.0";
const IAM_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const CONNECT_PATH: &str = "connect";
const EMPTY_PAYLOAD: &str = "{}";

/// `x-amz-date` 헤더 값 생성.
pub fn amz_date(at: DateTime<Utc>) -> String {
    at.format(AMZ_DATE_FORMAT).to_string()
}

// ============================================================================
// 인증 헤더
// ============================================================================

/// IAM 서명 결과 헤더.
#[derive(Clone, PartialEq)]
pub struct IamAuthHeader {
    /// GraphQL 엔드포인트 호스트
    pub host: String,
    /// SigV4 `authorization` 값
    pub authorization: String,
    /// 임시 자격증명 세션 토큰
    pub security_token: Option<String>,
    /// 서명 시각
    pub amz_date: String,
    /// `accept`
    pub accept: String,
    /// `content-encoding`
    pub content_encoding: String,
    /// `content-type`
    pub content_type: String,
    /// 서명에 포함된 기타 헤더 (평면 필드로 직렬화)
    pub additional: BTreeMap<String, String>,
}

/// 요청별 인증 헤더.
#[derive(Clone, PartialEq)]
pub enum AuthHeader {
    /// `{host, x-amz-date, x-api-key}`
    ApiKey {
        /// GraphQL 엔드포인트 호스트
        host: String,
        /// 요청 시각
        amz_date: String,
        /// API 키
        api_key: String,
    },
    /// `{host, Authorization}`
    Bearer {
        /// GraphQL 엔드포인트 호스트
        host: String,
        /// 토큰
        authorization: String,
    },
    /// `{host, authorization, X-Amz-Security-Token, x-amz-date, accept, content-encoding, content-type, ...}`
    Iam(IamAuthHeader),
}

impl AuthHeader {
    /// API 키 헤더 생성.
    pub fn api_key(
        host: impl Into<String>,
        amz_date: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        AuthHeader::ApiKey {
            host: host.into(),
            amz_date: amz_date.into(),
            api_key: api_key.into(),
        }
    }

    /// Bearer 토큰 헤더 생성.
    pub fn bearer(host: impl Into<String>, token: impl Into<String>) -> Self {
        AuthHeader::Bearer {
            host: host.into(),
            authorization: token.into(),
        }
    }

    /// 헤더의 `host` 값.
    pub fn host(&self) -> &str {
        match self {
            AuthHeader::ApiKey { host, .. } | AuthHeader::Bearer { host, .. } => host,
            AuthHeader::Iam(iam) => &iam.host,
        }
    }

    /// 핸드셰이크 URL용 base64(JSON) 인코딩.
    pub fn to_base64(&self) -> RealtimeResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }
}

impl Serialize for AuthHeader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AuthHeader::ApiKey {
                host,
                amz_date,
                api_key,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("host", host)?;
                map.serialize_entry("x-amz-date", amz_date)?;
                map.serialize_entry("x-api-key", api_key)?;
                map.end()
            }
            AuthHeader::Bearer {
                host,
                authorization,
            } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("host", host)?;
                map.serialize_entry("Authorization", authorization)?;
                map.end()
            }
            AuthHeader::Iam(iam) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("host", &iam.host)?;
                map.serialize_entry("authorization", &iam.authorization)?;
                if let Some(token) = &iam.security_token {
                    map.serialize_entry("X-Amz-Security-Token", token)?;
                }
                map.serialize_entry("x-amz-date", &iam.amz_date)?;
                map.serialize_entry("accept", &iam.accept)?;
                map.serialize_entry("content-encoding", &iam.content_encoding)?;
                map.serialize_entry("content-type", &iam.content_type)?;
                for (key, value) in &iam.additional {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthHeader::ApiKey { host, amz_date, .. } => f
                .debug_struct("ApiKey")
                .field("host", host)
                .field("amz_date", amz_date)
                .field("api_key", &"***REDACTED***")
                .finish(),
            AuthHeader::Bearer { host, .. } => f
                .debug_struct("Bearer")
                .field("host", host)
                .field("authorization", &"***REDACTED***")
                .finish(),
            AuthHeader::Iam(iam) => iam.fmt(f),
        }
    }
}

impl fmt::Debug for IamAuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iam")
            .field("host", &self.host)
            .field("amz_date", &self.amz_date)
            .field("authorization", &"***REDACTED***")
            .field("security_token", &self.security_token.as_ref().map(|_| "***"))
            .field("additional", &self.additional.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// 핸드셰이크 URL에 `header`/`payload` 쿼리 파라미터를 추가합니다.
pub fn decorate_connection_url(url: &Url, header: &AuthHeader) -> RealtimeResult<Url> {
    let mut decorated = url.clone();
    decorated
        .query_pairs_mut()
        .append_pair("header", &header.to_base64()?)
        .append_pair("payload", &BASE64.encode(EMPTY_PAYLOAD));
    Ok(decorated)
}

// ============================================================================
// 인증 데코레이터 트레이트
// ============================================================================

/// 서명 대상.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignTarget {
    /// 핸드셰이크 (`POST {endpoint}/connect`, 본문 `{}`)
    Connect,
    /// `start` 요청 (`POST {endpoint}`, 본문 = `payload.data`)
    Start,
}

/// 아웃바운드 요청/핸드셰이크 URL에 인증 헤더를 붙이는 데코레이터.
///
/// 입력을 변경하지 않고 새 값을 반환하며, 동시에 여러 요청에 대해 호출될 수
/// 있습니다. 토큰/자격증명 조회 실패는 에러로 반환되며 서명되지 않은 요청으로
/// 대체되지 않습니다.
#[async_trait]
pub trait AuthInterceptor: Send + Sync {
    /// 인증 모드 이름.
    fn mode_name(&self) -> &'static str;

    /// 주어진 본문에 대한 인증 헤더 생성.
    async fn auth_header(
        &self,
        endpoint: &Url,
        body: &str,
        target: SignTarget,
    ) -> RealtimeResult<AuthHeader>;

    /// 핸드셰이크 URL 데코레이션.
    async fn intercept_connection(&self, url: &Url, endpoint: &Url) -> RealtimeResult<Url> {
        let header = self
            .auth_header(endpoint, EMPTY_PAYLOAD, SignTarget::Connect)
            .await?;
        debug!(mode = self.mode_name(), host = %header.host(), "Decorated connection url");
        decorate_connection_url(url, &header)
    }

    /// 요청 데코레이션. `start`만 서명하고 나머지는 그대로 통과시킵니다.
    async fn intercept_request(
        &self,
        request: RealtimeRequest,
        endpoint: &Url,
    ) -> RealtimeResult<RealtimeRequest> {
        match request {
            RealtimeRequest::Start(start) => {
                let header = self
                    .auth_header(endpoint, &start.data, SignTarget::Start)
                    .await?;
                Ok(RealtimeRequest::Start(StartRequest {
                    auth: Some(header),
                    ..start
                }))
            }
            other => Ok(other),
        }
    }
}

// ============================================================================
// API 키
// ============================================================================

/// API 키 인증.
pub struct ApiKeyAuthInterceptor {
    api_key: SecretString,
}

impl ApiKeyAuthInterceptor {
    /// 새 API 키 데코레이터 생성.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into().into()),
        }
    }
}

#[async_trait]
impl AuthInterceptor for ApiKeyAuthInterceptor {
    fn mode_name(&self) -> &'static str {
        "api_key"
    }

    async fn auth_header(
        &self,
        endpoint: &Url,
        _body: &str,
        _target: SignTarget,
    ) -> RealtimeResult<AuthHeader> {
        Ok(AuthHeader::api_key(
            auth_host(endpoint)?,
            amz_date(Utc::now()),
            self.api_key.expose_secret(),
        ))
    }
}

// ============================================================================
// Bearer 토큰
// ============================================================================

/// 최신 토큰 공급자 (Cognito User Pools, OIDC, Lambda 인가자).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// 최신 토큰 조회.
    async fn latest_token(&self) -> RealtimeResult<String>;
}

/// 고정 토큰 공급자.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    /// 새 고정 토큰 공급자 생성.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into()),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn latest_token(&self) -> RealtimeResult<String> {
        Ok(self.token.expose_secret().to_string())
    }
}

/// Bearer 토큰 인증.
pub struct BearerAuthInterceptor {
    provider: Arc<dyn TokenProvider>,
}

impl BearerAuthInterceptor {
    /// 토큰 공급자로 생성.
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }

    /// 고정 토큰으로 생성.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticTokenProvider::new(token)))
    }
}

#[async_trait]
impl AuthInterceptor for BearerAuthInterceptor {
    fn mode_name(&self) -> &'static str {
        "bearer"
    }

    async fn auth_header(
        &self,
        endpoint: &Url,
        _body: &str,
        _target: SignTarget,
    ) -> RealtimeResult<AuthHeader> {
        let token = self.provider.latest_token().await.map_err(|e| {
            warn!(error = %e, "Failed to fetch latest token");
            match e {
                RealtimeError::Signing(_) => e,
                other => RealtimeError::Signing(other.to_string()),
            }
        })?;
        if token.is_empty() {
            return Err(RealtimeError::Signing("token provider returned an empty token".to_string()));
        }
        Ok(AuthHeader::bearer(auth_host(endpoint)?, token))
    }
}

// ============================================================================
// IAM (SigV4)
// ============================================================================

/// AWS 자격증명.
pub struct AwsCredentials {
    /// 액세스 키 ID
    pub access_key_id: String,
    /// 시크릿 액세스 키
    pub secret_access_key: SecretString,
    /// 세션 토큰 (임시 자격증명)
    pub session_token: Option<SecretString>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***REDACTED***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// 자격증명 공급자.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// 현재 자격증명 조회.
    async fn credentials(&self) -> RealtimeResult<AwsCredentials>;
}

/// SigV4 서명 대상 요청 서술자.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningRequest {
    /// HTTP 메서드
    pub method: &'static str,
    /// 요청 URL
    pub url: Url,
    /// 서명할 헤더 (`host` 포함)
    pub headers: BTreeMap<String, String>,
    /// 요청 본문
    pub body: String,
}

/// SigV4 서명기.
///
/// 서명된 헤더 맵을 반환해야 하며 `authorization`은 필수입니다.
/// 키는 대소문자를 구분하지 않습니다.
#[async_trait]
pub trait SigV4Signer: Send + Sync {
    /// 요청 서명.
    async fn sign(
        &self,
        request: &SigningRequest,
        credentials: &AwsCredentials,
        region: &str,
        service: &str,
        timestamp: DateTime<Utc>,
    ) -> RealtimeResult<BTreeMap<String, String>>;
}

/// IAM 인증.
pub struct IamAuthInterceptor {
    signer: Arc<dyn SigV4Signer>,
    credentials: Arc<dyn CredentialsProvider>,
    region: String,
    service: String,
}

impl IamAuthInterceptor {
    /// 새 IAM 데코레이터 생성.
    pub fn new(
        signer: Arc<dyn SigV4Signer>,
        credentials: Arc<dyn CredentialsProvider>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            signer,
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    fn signing_request(
        endpoint: &Url,
        host: &str,
        body: &str,
        target: SignTarget,
    ) -> RealtimeResult<SigningRequest> {
        let mut url = endpoint.clone();
        if target == SignTarget::Connect {
            url.path_segments_mut()
                .map_err(|_| RealtimeError::InvalidRequest("endpoint cannot be a base".to_string()))?
                .pop_if_empty()
                .push(CONNECT_PATH);
        }

        let headers = BTreeMap::from([
            ("host".to_string(), host.to_string()),
            ("accept".to_string(), IAM_ACCEPT.to_string()),
            ("content-encoding".to_string(), IAM_CONTENT_ENCODING.to_string()),
            ("content-type".to_string(), IAM_CONTENT_TYPE.to_string()),
        ]);

        Ok(SigningRequest {
            method: "POST",
            url,
            headers,
            body: body.to_string(),
        })
    }
}

#[async_trait]
impl AuthInterceptor for IamAuthInterceptor {
    fn mode_name(&self) -> &'static str {
        "iam"
    }

    async fn auth_header(
        &self,
        endpoint: &Url,
        body: &str,
        target: SignTarget,
    ) -> RealtimeResult<AuthHeader> {
        let host = auth_host(endpoint)?;
        let request = Self::signing_request(endpoint, &host, body, target)?;
        let credentials = self.credentials.credentials().await.map_err(|e| {
            warn!(error = %e, "Failed to resolve AWS credentials");
            RealtimeError::Signing(e.to_string())
        })?;

        let timestamp = Utc::now();
        let signed = self
            .signer
            .sign(&request, &credentials, &self.region, &self.service, timestamp)
            .await
            .map_err(|e| match e {
                RealtimeError::Signing(_) => e,
                other => RealtimeError::Signing(other.to_string()),
            })?;

        let mut authorization = None;
        let mut security_token = None;
        let mut signed_date = None;
        let mut additional = BTreeMap::new();
        for (key, value) in signed {
            match key.to_ascii_lowercase().as_str() {
                "authorization" => authorization = Some(value),
                "x-amz-security-token" => security_token = Some(value),
                "x-amz-date" => signed_date = Some(value),
                "host" | "accept" | "content-encoding" | "content-type" => {}
                _ => {
                    additional.insert(key, value);
                }
            }
        }

        let authorization = authorization.ok_or_else(|| {
            RealtimeError::Signing("signer did not produce an authorization header".to_string())
        })?;
        let security_token = security_token.or_else(|| {
            credentials
                .session_token
                .as_ref()
                .map(|t| t.expose_secret().to_string())
        });

        Ok(AuthHeader::Iam(IamAuthHeader {
            host,
            authorization,
            security_token,
            amz_date: signed_date.unwrap_or_else(|| amz_date(timestamp)),
            accept: IAM_ACCEPT.to_string(),
            content_encoding: IAM_CONTENT_ENCODING.to_string(),
            content_type: IAM_CONTENT_TYPE.to_string(),
            additional,
        }))
    }
}

// ============================================================================
// 설정 기반 생성
// ============================================================================

/// IAM 모드에 필요한 외부 구성요소.
#[derive(Clone)]
pub struct IamSigning {
    /// SigV4 서명기
    pub signer: Arc<dyn SigV4Signer>,
    /// 자격증명 공급자
    pub credentials: Arc<dyn CredentialsProvider>,
}

/// 설정의 인증 모드로 데코레이터를 생성합니다.
///
/// IAM 모드는 서명기와 자격증명 공급자가 반드시 주어져야 합니다.
pub fn interceptor_from_config(
    auth: &AuthConfig,
    region: &str,
    iam: Option<IamSigning>,
) -> RealtimeResult<Arc<dyn AuthInterceptor>> {
    let interceptor: Arc<dyn AuthInterceptor> = match auth {
        AuthConfig::ApiKey { api_key } => Arc::new(ApiKeyAuthInterceptor::new(api_key.clone())),
        AuthConfig::UserPools { token }
        | AuthConfig::OpenIdConnect { token }
        | AuthConfig::Function { token } => Arc::new(BearerAuthInterceptor::with_token(token.clone())),
        AuthConfig::Iam { service } => {
            let iam = iam.ok_or_else(|| {
                RealtimeError::Signing(
                    "iam auth mode requires a SigV4 signer and credentials provider".to_string(),
                )
            })?;
            Arc::new(IamAuthInterceptor::new(
                iam.signer,
                iam.credentials,
                region,
                service.clone(),
            ))
        }
    };

    debug!(mode = auth.mode_name(), "Auth interceptor created");
    Ok(interceptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn endpoint() -> Url {
        Url::parse("https://abc.appsync-api.us-east-1.amazonaws.com/graphql").unwrap()
    }

    fn realtime() -> Url {
        Url::parse("wss://abc.appsync-realtime-api.us-east-1.amazonaws.com/graphql").unwrap()
    }

    struct FailingTokenProvider;

    #[async_trait]
    impl TokenProvider for FailingTokenProvider {
        async fn latest_token(&self) -> RealtimeResult<String> {
            Err(RealtimeError::unknown("user signed out"))
        }
    }

    struct StaticCredentials;

    #[async_trait]
    impl CredentialsProvider for StaticCredentials {
        async fn credentials(&self) -> RealtimeResult<AwsCredentials> {
            Ok(AwsCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: SecretString::new("secret".to_string().into()),
                session_token: Some(SecretString::new("session".to_string().into())),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSigner {
        requests: Mutex<Vec<SigningRequest>>,
    }

    #[async_trait]
    impl SigV4Signer for RecordingSigner {
        async fn sign(
            &self,
            request: &SigningRequest,
            _credentials: &AwsCredentials,
            region: &str,
            service: &str,
            _timestamp: DateTime<Utc>,
        ) -> RealtimeResult<BTreeMap<String, String>> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(BTreeMap::from([
                (
                    "Authorization".to_string(),
                    format!("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/{}/{}", region, service),
                ),
                ("X-Amz-Date".to_string(), "20240101T000000Z".to_string()),
                ("x-amz-content-sha256".to_string(), "abc".to_string()),
                ("host".to_string(), "ignored".to_string()),
            ]))
        }
    }

    fn decode_header_param(url: &Url) -> Value {
        let header = url
            .query_pairs()
            .find(|(k, _)| k == "header")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        serde_json::from_slice(&BASE64.decode(header).unwrap()).unwrap()
    }

    #[test]
    fn test_amz_date_format() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(amz_date(at), "20240305T070809Z");
    }

    #[tokio::test]
    async fn test_api_key_connection_url() {
        let interceptor = ApiKeyAuthInterceptor::new("da2-secret");
        let url = interceptor
            .intercept_connection(&realtime(), &endpoint())
            .await
            .unwrap();

        let header = decode_header_param(&url);
        assert_eq!(header["host"], "abc.appsync-api.us-east-1.amazonaws.com");
        assert_eq!(header["x-api-key"], "da2-secret");
        assert_eq!(header["x-amz-date"].as_str().unwrap().len(), 16);

        let payload = url
            .query_pairs()
            .find(|(k, _)| k == "payload")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(BASE64.decode(payload).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_only_start_is_decorated() {
        let interceptor = BearerAuthInterceptor::with_token("jwt-token");

        let stop = interceptor
            .intercept_request(RealtimeRequest::stop("a"), &endpoint())
            .await
            .unwrap();
        assert_eq!(stop, RealtimeRequest::stop("a"));

        let original = RealtimeRequest::start("a", "{}");
        let start = interceptor
            .intercept_request(original.clone(), &endpoint())
            .await
            .unwrap();
        assert_ne!(start, original);

        let value: Value = serde_json::from_str(&start.encode().unwrap()).unwrap();
        assert_eq!(
            value["payload"]["extensions"]["authorization"],
            json!({"host": "abc.appsync-api.us-east-1.amazonaws.com", "Authorization": "jwt-token"})
        );
    }

    #[tokio::test]
    async fn test_token_failure_is_signing_error() {
        let interceptor = BearerAuthInterceptor::new(Arc::new(FailingTokenProvider));
        let result = interceptor
            .intercept_request(RealtimeRequest::start("a", "{}"), &endpoint())
            .await;
        assert!(matches!(result, Err(RealtimeError::Signing(_))));
    }

    #[tokio::test]
    async fn test_iam_header_fields() {
        let signer = Arc::new(RecordingSigner::default());
        let interceptor =
            IamAuthInterceptor::new(signer.clone(), Arc::new(StaticCredentials), "us-east-1", "appsync");

        let url = interceptor
            .intercept_connection(&realtime(), &endpoint())
            .await
            .unwrap();
        let header = decode_header_param(&url);

        assert_eq!(
            header["authorization"],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/us-east-1/appsync"
        );
        assert_eq!(header["X-Amz-Security-Token"], "session");
        assert_eq!(header["x-amz-date"], "20240101T000000Z");
        assert_eq!(header["content-encoding"], "amz-1.0");
        assert_eq!(header["content-type"], "application/json; charset=UTF-8");
        assert_eq!(header["x-amz-content-sha256"], "abc");
        assert_eq!(header["host"], "abc.appsync-api.us-east-1.amazonaws.com");

        let requests = signer.requests.lock().unwrap();
        assert_eq!(requests[0].url.path(), "/graphql/connect");
        assert_eq!(requests[0].body, "{}");
        assert_eq!(requests[0].method, "POST");
    }

    #[tokio::test]
    async fn test_iam_start_signs_data_body() {
        let signer = Arc::new(RecordingSigner::default());
        let interceptor =
            IamAuthInterceptor::new(signer.clone(), Arc::new(StaticCredentials), "us-east-1", "appsync");

        interceptor
            .intercept_request(RealtimeRequest::start("a", r#"{"query":"q"}"#), &endpoint())
            .await
            .unwrap();

        let requests = signer.requests.lock().unwrap();
        assert_eq!(requests[0].url.path(), "/graphql");
        assert_eq!(requests[0].body, r#"{"query":"q"}"#);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let header = AuthHeader::api_key("host", "20240101T000000Z", "da2-secret");
        assert!(!format!("{:?}", header).contains("da2-secret"));

        let bearer = AuthHeader::bearer("host", "jwt");
        assert!(!format!("{:?}", bearer).contains("jwt"));
    }

    #[test]
    fn test_iam_from_config_requires_signer() {
        let auth = AuthConfig::Iam {
            service: "appsync".to_string(),
        };
        assert!(matches!(
            interceptor_from_config(&auth, "us-east-1", None),
            Err(RealtimeError::Signing(_))
        ));

        let api_key = AuthConfig::ApiKey {
            api_key: "da2-key".to_string(),
        };
        let interceptor = interceptor_from_config(&api_key, "us-east-1", None).unwrap();
        assert_eq!(interceptor.mode_name(), "api_key");
    }
}
