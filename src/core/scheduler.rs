use crate::utils::retry::RetryStrategy;
use super::cancel::AttemptToken;
use super::errors::{Result, UploadError};
use super::progress::chunk_percent;
use super::source::SourceFile;
use super::traits::{ChunkRequest, TransportAdapter};
use super::types::{ChunkPlan, MediaMetadata, PreviewImage};

/// 一次分块传输的输入
#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub upload_id: String,
    pub plan: ChunkPlan,
    /// 随第 0 块发送
    pub preview: Option<PreviewImage>,
    pub metadata: Option<MediaMetadata>,
}

/// 分块确认后的进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    pub chunk_index: u64,
    pub plan: ChunkPlan,
    pub percent: u8,
}

/// Drives chunks `0..total_chunks` strictly one at a time.
pub struct ChunkScheduler<'a> {
    transport: &'a dyn TransportAdapter,
    source: &'a SourceFile,
    token: &'a AttemptToken,
    retry_count: u32,
    strategy: RetryStrategy,
}

impl<'a> ChunkScheduler<'a> {
    pub fn new(
        transport: &'a dyn TransportAdapter,
        source: &'a SourceFile,
        token: &'a AttemptToken,
        retry_count: u32,
        strategy: RetryStrategy,
    ) -> Self {
        Self {
            transport,
            source,
            token,
            retry_count,
            strategy,
        }
    }

    /// 按顺序上传所有分块，每次确认后调用 `on_ack`
    ///
    /// `on_ack` 返回错误时（例如尝试已过期）立即停止。
    pub async fn run<F>(&self, job: ChunkJob, mut on_ack: F) -> Result<ChunkPlan>
    where
        F: FnMut(ChunkAck) -> Result<()>,
    {
        let mut plan = job.plan;
        let total = plan.total_chunks;
        let mut retries = 0u32;

        while plan.next_chunk_index < total {
            self.token.checkpoint()?;

            let index = plan.next_chunk_index;
            let (start, end) = plan.chunk_range(index, self.source.size_bytes());
            let (preview, metadata) = if index == 0 {
                (job.preview.clone(), job.metadata.clone())
            } else {
                (None, None)
            };

            let result = self
                .token
                .guard(async {
                    let data = self.source.read_range(start, end).await?;
                    let response = self
                        .transport
                        .upload_chunk(ChunkRequest {
                            upload_id: job.upload_id.clone(),
                            chunk_index: index,
                            data,
                            total_chunks: total,
                            preview,
                            metadata,
                        })
                        .await?;

                    if !response.received {
                        return Err(UploadError::NotReceived { chunk_index: index });
                    }
                    Ok(response)
                })
                .await;

            match result {
                Ok(response) => {
                    // 服务端返回的下标优先
                    let next = response
                        .next_expected_index
                        .unwrap_or(index + 1)
                        .min(total);
                    plan.next_chunk_index = next;
                    plan.chunks_uploaded = plan.chunks_uploaded.max(next).min(total);
                    retries = 0;

                    tracing::debug!(
                        upload_id = %job.upload_id,
                        chunk_index = index,
                        next_chunk_index = next,
                        total_chunks = total,
                        "Chunk acknowledged"
                    );

                    on_ack(ChunkAck {
                        chunk_index: index,
                        plan,
                        percent: chunk_percent(plan.chunks_uploaded, total),
                    })?;
                }
                Err(error) if error.is_aborted() => return Err(error),
                Err(error) => {
                    self.token.checkpoint()?;

                    retries += 1;
                    if retries > self.retry_count {
                        tracing::error!(
                            upload_id = %job.upload_id,
                            chunk_index = index,
                            attempts = retries,
                            error = %error,
                            "Chunk retries exhausted"
                        );
                        return Err(UploadError::RetriesExhausted {
                            operation: format!("chunk {index}"),
                            attempts: retries,
                            source: Box::new(error),
                        });
                    }

                    let delay = self.strategy.get_delay(retries - 1);
                    tracing::warn!(
                        upload_id = %job.upload_id,
                        chunk_index = index,
                        retry = retries,
                        max_retries = self.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Chunk upload failed, retrying"
                    );
                    self.token.sleep(delay).await?;
                }
            }
        }

        Ok(plan)
    }
}
