//! 설정 파일 검증.

use anyhow::Result;
use tracing::info;

use appsync_realtime::realtime_url;

use super::load_config;

/// 설정을 로드/검증하고 계산된 실시간 URL을 출력합니다.
pub fn check_config(path: &str) -> Result<()> {
    let config = load_config(path)?;

    config.validate()?;
    let endpoint = config.endpoint_url()?;
    let url = realtime_url(&endpoint)?;

    info!(path, auth = config.auth.mode_name(), "Configuration is valid");
    println!("endpoint:  {}", endpoint);
    println!("realtime:  {}", url);
    println!("auth mode: {}", config.auth.mode_name());
    println!("region:    {}", config.region);
    Ok(())
}
