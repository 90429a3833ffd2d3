//! 설정 관리.
//!
//! 실시간 클라이언트가 사용하는 엔드포인트, 인증 모드, 타임아웃, 재시도 정책을
//! 정의하고 파일/환경 변수에서 로드합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{CoreError, CoreResult};

/// 환경 변수 접두사.
pub const ENV_PREFIX: &str = "APPSYNC";

/// 실시간 클라이언트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RealtimeConfig {
    /// GraphQL 엔드포인트 (예: `https://xxxx.appsync-api.us-east-1.amazonaws.com/graphql`)
    pub endpoint: String,
    /// AWS 리전 (IAM 서명에 사용)
    #[serde(default = "default_region")]
    pub region: String,
    /// 인증 모드
    pub auth: AuthConfig,
    /// 연결 설정
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// 재시도 설정
    #[serde(default)]
    pub retry: RetryConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// 인증 모드 설정.
///
/// # 보안
/// - `Debug` 구현은 API 키와 토큰을 마스킹합니다.
#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// 정적 API 키
    ApiKey {
        /// API 키 (`x-api-key`)
        api_key: String,
    },
    /// Cognito User Pool 토큰
    UserPools {
        /// JWT 토큰
        token: String,
    },
    /// OpenID Connect 토큰
    OpenIdConnect {
        /// OIDC 토큰
        token: String,
    },
    /// Lambda 인가자 토큰
    Function {
        /// 인가자에 전달할 토큰
        token: String,
    },
    /// IAM (SigV4)
    Iam {
        /// 서명 서비스 이름
        #[serde(default = "default_iam_service")]
        service: String,
    },
}

fn default_iam_service() -> String {
    "appsync".to_string()
}

fn mask(secret: &str) -> String {
    if secret.len() > 8 {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        "***REDACTED***".to_string()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::ApiKey { api_key } => f
                .debug_struct("ApiKey")
                .field("api_key", &mask(api_key))
                .finish(),
            AuthConfig::UserPools { token } => f
                .debug_struct("UserPools")
                .field("token", &mask(token))
                .finish(),
            AuthConfig::OpenIdConnect { token } => f
                .debug_struct("OpenIdConnect")
                .field("token", &mask(token))
                .finish(),
            AuthConfig::Function { token } => f
                .debug_struct("Function")
                .field("token", &mask(token))
                .finish(),
            AuthConfig::Iam { service } => {
                f.debug_struct("Iam").field("service", service).finish()
            }
        }
    }
}

impl AuthConfig {
    /// 인증 모드 이름 반환.
    pub fn mode_name(&self) -> &'static str {
        match self {
            AuthConfig::ApiKey { .. } => "api_key",
            AuthConfig::UserPools { .. } => "user_pools",
            AuthConfig::OpenIdConnect { .. } => "open_id_connect",
            AuthConfig::Function { .. } => "function",
            AuthConfig::Iam { .. } => "iam",
        }
    }

    /// Bearer 토큰 방식 인증인지 확인.
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            AuthConfig::UserPools { token }
            | AuthConfig::OpenIdConnect { token }
            | AuthConfig::Function { token } => Some(token),
            _ => None,
        }
    }
}

/// 연결 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// `connection_ack` 대기 시간 (밀리초)
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// `start`/`stop` 응답 대기 시간 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 연결 상태 전이 대기 시간 (밀리초)
    #[serde(default = "default_state_wait_timeout_ms")]
    pub state_wait_timeout_ms: u64,
    /// 서버가 `connectionTimeoutMs`를 보내지 않을 때 사용할 keep-alive 윈도우 (밀리초)
    #[serde(default = "default_keep_alive_ms")]
    pub default_keep_alive_ms: u64,
    /// 네트워크 복구 시 자동 재연결
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// 연결 실패 시 자동 재시도
    #[serde(default = "default_true")]
    pub auto_retry: bool,
    /// 내부 브로드캐스트 채널 버퍼 크기
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_state_wait_timeout_ms() -> u64 {
    10_000
}
fn default_keep_alive_ms() -> u64 {
    300_000
} // AppSync 기본값 5분
fn default_true() -> bool {
    true
}
fn default_event_buffer() -> usize {
    1024
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            state_wait_timeout_ms: default_state_wait_timeout_ms(),
            default_keep_alive_ms: default_keep_alive_ms(),
            auto_reconnect: true,
            auto_retry: true,
            event_buffer: default_event_buffer(),
        }
    }
}

impl ConnectionConfig {
    /// ack 대기 시간.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 요청 응답 대기 시간.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 상태 전이 대기 시간.
    pub fn state_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.state_wait_timeout_ms)
    }

    /// 기본 keep-alive 윈도우.
    pub fn default_keep_alive(&self) -> Duration {
        Duration::from_millis(self.default_keep_alive_ms)
    }
}

/// 재시도 설정 (지수 백오프 + full jitter).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (첫 시도 제외)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 기본 지연 (밀리초)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// 최대 지연 (밀리초)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    8
}
fn default_base_delay_ms() -> u64 {
    25
}
fn default_max_delay_ms() -> u64 {
    6_400
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// 재시도 없이 한 번만 시도하는 설정.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl RealtimeConfig {
    /// 최소 설정으로 생성 (나머지는 기본값).
    pub fn new(endpoint: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: default_region(),
            auth,
            connection: ConnectionConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일 형식은 확장자로 판단하며 (`.toml`, `.json`, `.yaml`),
    /// `APPSYNC` 접두사 환경 변수가 파일 값을 덮어씁니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .set_default("region", default_region())?
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        let config: RealtimeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 파싱된 엔드포인트 URL 반환.
    pub fn endpoint_url(&self) -> CoreResult<Url> {
        Url::parse(&self.endpoint).map_err(|e| CoreError::invalid("endpoint", e.to_string()))
    }

    /// 설정 값 검증.
    pub fn validate(&self) -> CoreResult<()> {
        let url = self.endpoint_url()?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(CoreError::invalid(
                "endpoint",
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        if url.host_str().is_none() {
            return Err(CoreError::invalid("endpoint", "missing host"));
        }

        match &self.auth {
            AuthConfig::ApiKey { api_key } if api_key.trim().is_empty() => {
                return Err(CoreError::invalid("auth.api_key", "must not be empty"));
            }
            AuthConfig::Iam { service } if service.trim().is_empty() => {
                return Err(CoreError::invalid("auth.service", "must not be empty"));
            }
            _ => {}
        }
        if let Some(token) = self.auth.bearer_token() {
            if token.trim().is_empty() {
                return Err(CoreError::invalid("auth.token", "must not be empty"));
            }
        }

        let conn = &self.connection;
        if conn.ack_timeout_ms == 0 {
            return Err(CoreError::invalid("connection.ack_timeout_ms", "must be > 0"));
        }
        if conn.request_timeout_ms == 0 {
            return Err(CoreError::invalid(
                "connection.request_timeout_ms",
                "must be > 0",
            ));
        }
        if conn.state_wait_timeout_ms == 0 {
            return Err(CoreError::invalid(
                "connection.state_wait_timeout_ms",
                "must be > 0",
            ));
        }
        if conn.event_buffer == 0 {
            return Err(CoreError::invalid("connection.event_buffer", "must be > 0"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(CoreError::invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn api_key_config() -> RealtimeConfig {
        RealtimeConfig::new(
            "https://abc.appsync-api.us-east-1.amazonaws.com/graphql",
            AuthConfig::ApiKey {
                api_key: "da2-1234567890abcdef".to_string(),
            },
        )
    }

    #[test]
    fn test_defaults() {
        let config = api_key_config();
        assert_eq!(config.connection.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.state_wait_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.max_retries, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let config = api_key_config();
        let debug = format!("{:?}", config.auth);
        assert!(!debug.contains("da2-1234567890abcdef"));
        assert!(debug.contains("da2-...cdef"));

        let short = AuthConfig::UserPools {
            token: "abc".to_string(),
        };
        assert!(format!("{:?}", short).contains("REDACTED"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = api_key_config();
        config.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = api_key_config();
        config.endpoint = "ftp://example.com/graphql".to_string();
        assert!(config.validate().is_err());

        let mut config = api_key_config();
        config.auth = AuthConfig::ApiKey {
            api_key: "  ".to_string(),
        };
        assert!(config.validate().is_err());

        let mut config = api_key_config();
        config.auth = AuthConfig::Function {
            token: String::new(),
        };
        assert!(config.validate().is_err());

        let mut config = api_key_config();
        config.connection.ack_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = api_key_config();
        config.retry.base_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_mode_names() {
        assert_eq!(api_key_config().auth.mode_name(), "api_key");
        let oidc = AuthConfig::OpenIdConnect {
            token: "t".to_string(),
        };
        assert_eq!(oidc.mode_name(), "open_id_connect");
        assert_eq!(oidc.bearer_token(), Some("t"));
        let iam = AuthConfig::Iam {
            service: "appsync".to_string(),
        };
        assert_eq!(iam.bearer_token(), None);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("appsync-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("realtime.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
endpoint = "https://example.com/graphql"

[auth]
type = "user_pools"
token = "eyJraWQiOiJ0ZXN0In0"

[connection]
ack_timeout_ms = 2500
"#
        )
        .unwrap();

        let config = RealtimeConfig::load(&path).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.connection.ack_timeout_ms, 2500);
        assert_eq!(config.connection.request_timeout_ms, 5000);
        assert_eq!(config.auth.mode_name(), "user_pools");

        std::fs::remove_dir_all(&dir).ok();
    }
}
