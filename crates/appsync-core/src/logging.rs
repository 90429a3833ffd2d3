//! 로깅 초기화.
//!
//! 설정 파일의 `[logging]` 섹션 또는 환경 변수(`RUST_LOG`, `LOG_FORMAT`)로
//! `tracing-subscriber`를 구성합니다. 출력 형식은 `pretty`, `json`, `compact` 중
//! 하나이며, `RUST_LOG`가 있으면 설정된 레벨보다 우선합니다.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{CoreError, CoreResult};

/// 출력 형식 환경 변수.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_LEVEL: &str = "info";

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 여러 줄, 색상 (터미널에서 구독을 지켜볼 때)
    #[default]
    Pretty,
    /// 한 줄 JSON (로그 수집기로 보낼 때)
    Json,
    /// 한 줄 텍스트
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(CoreError::Logging(format!("unknown log format `{}`", other))),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` 지시문 (예: `info`, `appsync_realtime=debug`)
    pub level: String,
    /// 출력 형식
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    /// 환경 변수에서 읽습니다. 없거나 잘못된 값은 기본값을 씁니다.
    pub fn from_env() -> Self {
        let level = std::env::var(EnvFilter::DEFAULT_ENV)
            .ok()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|f| f.parse().ok())
            .unwrap_or_default();
        Self { level, format }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            // 잘못된 형식 때문에 실행을 막지 않음
            format: config.format.parse().unwrap_or_default(),
        }
    }
}

/// 전역 subscriber 설치.
///
/// 이미 설치되어 있으면 `CoreError::Logging`을 반환합니다.
pub fn init_logging(config: LogConfig) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| CoreError::Logging(format!("invalid level `{}`: {}", config.level, e)))?;

    let output = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))?;

    tracing::debug!(format = ?config.format, level = %config.level, "Logging initialized");
    Ok(())
}

/// 설정 파일 없이 환경 변수만으로 로깅을 초기화합니다.
pub fn init_logging_from_env() -> CoreResult<()> {
    init_logging(LogConfig::from_env())
}

/// `subscription_id` 필드를 가진 debug span.
#[macro_export]
macro_rules! subscription_span {
    ($name:expr, $id:expr) => {
        tracing::debug_span!($name, subscription_id = %$id)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(CoreError::Logging(_))
        ));
    }

    #[test]
    fn test_from_logging_section_falls_back_to_pretty() {
        let section = LoggingConfig {
            level: "appsync_realtime=trace".to_string(),
            format: "bogus".to_string(),
        };
        let config = LogConfig::from(&section);

        assert_eq!(config.level, "appsync_realtime=trace");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_default_is_info_pretty() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
