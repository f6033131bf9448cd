use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use super::errors::{Result, UploadError};

/// 单次上传尝试的取消令牌
///
/// 每次 `start` / `resume` 都会分配新的令牌和递增的尝试编号，
/// 旧尝试的挂起点在恢复时都会返回 [`UploadError::Aborted`]。
#[derive(Debug, Clone)]
pub struct AttemptToken {
    token: CancellationToken,
    attempt: u64,
}

impl AttemptToken {
    pub fn new(attempt: u64) -> Self {
        Self {
            token: CancellationToken::new(),
            attempt,
        }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 检查点：已取消则返回 `Aborted`
    pub fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(UploadError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Runs one suspension point: checked before, raced against cancellation
    /// while pending, and checked again once it resolves.
    ///
    /// A failure observed after cancellation is reported as `Aborted` so the
    /// caller can tell an abort from a genuine transfer failure.
    pub async fn guard<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.checkpoint()?;

        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(UploadError::Aborted),
            result = future => result,
        };

        self.checkpoint()?;
        result
    }

    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.guard(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_guard_passes_through() {
        let token = AttemptToken::new(1);
        let value = token.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let token = AttemptToken::new(1);
        let sleeper = token.clone();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(60)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(UploadError::Aborted)));
    }

    #[tokio::test]
    async fn test_failure_after_cancel_is_abort() {
        let token = AttemptToken::new(3);
        let inner = token.clone();
        let result: Result<()> = token
            .guard(async move {
                inner.cancel();
                Err(UploadError::transport("connection reset"))
            })
            .await;

        assert!(matches!(result, Err(UploadError::Aborted)));
    }

    #[test]
    fn test_checkpoint() {
        let token = AttemptToken::new(0);
        assert!(token.checkpoint().is_ok());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.checkpoint().is_err());
    }
}
