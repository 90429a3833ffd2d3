//! CLI 명령어 구현 모듈.

pub mod check_config;
pub mod subscribe;

use anyhow::{Context, Result};

use appsync_core::config::RealtimeConfig;
use appsync_core::logging::{init_logging, init_logging_from_env, LogConfig};

/// 설정 파일을 읽고 그 `[logging]` 섹션으로 로깅을 초기화합니다.
///
/// 설정을 읽지 못하면 환경 변수 기준으로 로깅을 켜서 실패 원인을 남깁니다.
pub fn load_config(path: &str) -> Result<RealtimeConfig> {
    match RealtimeConfig::load(path) {
        Ok(config) => {
            init_logging(LogConfig::from(&config.logging))?;
            Ok(config)
        }
        Err(e) => {
            let _ = init_logging_from_env();
            Err(e).with_context(|| format!("Failed to load config from {}", path))
        }
    }
}
