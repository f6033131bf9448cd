use std::future::Future;
use std::time::Duration;
use crate::core::{AttemptToken, Result, UploadError};

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// 固定延迟
    Fixed(Duration),
    /// 指数退避
    Exponential {
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
}

impl RetryStrategy {
    /// 计算第 n 次重试的延迟（n 从 0 开始）
    pub fn get_delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Fixed(delay) => *delay,
            RetryStrategy::Exponential { initial, multiplier, max_delay } => {
                let delay = initial.as_secs_f64() * multiplier.powf(attempt as f64);
                if !delay.is_finite() || delay >= max_delay.as_secs_f64() {
                    return *max_delay;
                }
                Duration::from_secs_f64(delay)
            }
        }
    }
}

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 操作名，用于日志和错误信息
    pub operation: String,
    /// 首次失败后的最大重试次数
    pub max_retries: u32,
    /// 重试策略
    pub strategy: RetryStrategy,
}

impl RetryConfig {
    pub fn new(operation: impl Into<String>, max_retries: u32, strategy: RetryStrategy) -> Self {
        Self {
            operation: operation.into(),
            max_retries,
            strategy,
        }
    }
}

/// 执行带重试的操作，每次调用和每次等待都可被取消
pub async fn retry_with_config<F, Fut, T>(
    config: RetryConfig,
    token: &AttemptToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0u32;

    loop {
        let error = match token.guard(operation()).await {
            Ok(result) => return Ok(result),
            Err(UploadError::Aborted) => return Err(UploadError::Aborted),
            Err(error) => error,
        };

        // 检查是否应该重试
        if !error.is_retryable() {
            return Err(error);
        }

        retries += 1;
        if retries > config.max_retries {
            return Err(UploadError::RetriesExhausted {
                operation: config.operation,
                attempts: retries,
                source: Box::new(error),
            });
        }

        let delay = config.strategy.get_delay(retries - 1);
        tracing::warn!(
            operation = %config.operation,
            retry = retries,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Operation failed, retrying"
        );
        token.sleep(delay).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(max_retries: u32) -> RetryConfig {
        RetryConfig::new("test", max_retries, RetryStrategy::Fixed(Duration::from_millis(100)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success() {
        let token = AttemptToken::new(1);
        let mut count = 0;
        let result = retry_with_config(fixed(3), &token, || {
            count += 1;
            let current = count;
            async move {
                if current < 3 {
                    Err(UploadError::transport("timeout"))
                } else {
                    Ok(42)
                }
            }
        }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failure() {
        let token = AttemptToken::new(1);
        let mut count = 0;
        let result = retry_with_config(fixed(3), &token, || {
            count += 1;
            async { Err::<(), _>(UploadError::transport("timeout")) }
        }).await;

        match result {
            Err(UploadError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("unexpected result: {other:?}"),
        }
        // 首次 + 3 次重试
        assert_eq!(count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let token = AttemptToken::new(1);
        let mut count = 0;
        let result = retry_with_config(fixed(3), &token, || {
            count += 1;
            async { Err::<(), _>(UploadError::InvalidConfig("bad".to_string())) }
        }).await;

        assert!(matches!(result, Err(UploadError::InvalidConfig(_))));
        assert_eq!(count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_status_not_retried() {
        let token = AttemptToken::new(1);
        let mut count = 0;
        let result = retry_with_config(fixed(3), &token, || {
            count += 1;
            async { Err::<(), _>(UploadError::server_error(404, "unknown upload")) }
        }).await;

        assert!(matches!(result, Err(UploadError::Server { status: 404, .. })));
        assert_eq!(count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let token = AttemptToken::new(1);
        let canceller = token.clone();
        let config = RetryConfig::new("test", 5, RetryStrategy::Fixed(Duration::from_secs(30)));

        let handle = tokio::spawn(async move {
            retry_with_config(config, &token, || async {
                Err::<(), _>(UploadError::transport("down"))
            }).await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
        assert!(matches!(handle.await.unwrap(), Err(UploadError::Aborted)));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let strategy = RetryStrategy::Exponential {
            initial: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3),
        };

        assert_eq!(strategy.get_delay(0), Duration::from_millis(500));
        assert_eq!(strategy.get_delay(1), Duration::from_secs(1));
        assert_eq!(strategy.get_delay(2), Duration::from_secs(2));
        assert_eq!(strategy.get_delay(3), Duration::from_secs(3));
        assert_eq!(strategy.get_delay(40), Duration::from_secs(3));
    }
}
