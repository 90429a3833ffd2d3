//! # AppSync Core
//!
//! AppSync 실시간 클라이언트 전반에서 사용되는 공통 기반을 제공합니다:
//! - 엔드포인트/인증/타임아웃/재시도 설정 관리
//! - 로깅 인프라
//! - 설정 에러 타입

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;
