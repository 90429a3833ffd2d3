//! 지수 백오프 + full jitter 재시도.
//!
//! 재시도 조건은 호출자가 명시합니다. 영구 에러를 가리지 않도록
//! 무조건 재시도는 제공하지 않습니다.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use appsync_core::config::RetryConfig;

use crate::error::RealtimeResult;

/// `attempt`번째 재시도 전 대기 시간 (0부터 시작).
///
/// `[0, min(max_delay, base_delay * 2^attempt)]` 구간에서 균등 추출합니다.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let cap = backoff_cap_ms(config, attempt);
    if cap == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
}

fn backoff_cap_ms(config: &RetryConfig, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms)
}

/// 조건을 만족하는 에러에 대해서만 재시도합니다.
///
/// 첫 시도 이후 최대 `max_retries`번 재시도하며, 마지막 에러를 반환합니다.
pub async fn with_retry_if<T, F, Fut, P>(
    config: &RetryConfig,
    operation: &str,
    should_retry: P,
    mut op: F,
) -> RealtimeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RealtimeResult<T>>,
    P: Fn(&crate::error::RealtimeError) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < config.max_retries && should_retry(&e) => {
                let delay = backoff_delay(config, attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RealtimeError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 25,
            max_delay_ms: 100,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let cfg = config(8);
        assert_eq!(backoff_cap_ms(&cfg, 0), 25);
        assert_eq!(backoff_cap_ms(&cfg, 1), 50);
        assert_eq!(backoff_cap_ms(&cfg, 2), 100);
        assert_eq!(backoff_cap_ms(&cfg, 30), 100);
        assert_eq!(backoff_cap_ms(&cfg, u32::MAX), 100);

        for attempt in 0..10 {
            assert!(backoff_delay(&cfg, attempt) <= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_only_matching_errors() {
        let calls = AtomicU32::new(0);
        let result: RealtimeResult<()> = with_retry_if(
            &config(3),
            "test",
            |e| matches!(e, RealtimeError::MaxSubscriptionsReached),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RealtimeError::Unauthorized) }
            },
        )
        .await;

        assert!(matches!(result, Err(RealtimeError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: RealtimeResult<()> = with_retry_if(
            &config(3),
            "test",
            |e| matches!(e, RealtimeError::MaxSubscriptionsReached),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RealtimeError::MaxSubscriptionsReached) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry_if(
            &config(3),
            "test",
            RealtimeError::is_transport,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RealtimeError::Transport("reset".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 1);
    }
}
