use std::fmt;
use std::time::Duration;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::utils::retry::RetryStrategy;
use super::errors::{Result, UploadError};

// Duration 以毫秒整数序列化
fn serialize_duration_ms<S>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_duration_ms<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// 已选择文件，等待开始
    Pending,
    /// 上传中
    Uploading,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 失败，可重试
    Error,
}

impl UploadStatus {
    pub fn is_valid_transition(from: UploadStatus, to: UploadStatus) -> bool {
        use UploadStatus::*;

        matches!(
            (from, to),
            (Pending, Uploading)
                | (Error, Uploading)
                | (Uploading, Paused)
                | (Paused, Uploading)
                | (Uploading, Completed)
                | (Paused, Completed)
                | (Uploading, Error)
                | (Paused, Error)
                | (Uploading, Pending)
                | (Paused, Pending)
                | (Error, Pending)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Paused => "paused",
            UploadStatus::Completed => "completed",
            UploadStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// 文件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Archive,
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Audio => "audio",
            FileCategory::Document => "document",
            FileCategory::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// 重试退避方式
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryBackoff {
    /// 固定延迟 `retry_delay_ms`
    Fixed,
    /// 从 `retry_delay_ms` 开始按倍数增长
    Exponential {
        multiplier: f64,
        #[serde(
            rename = "max_delay_ms",
            serialize_with = "serialize_duration_ms",
            deserialize_with = "deserialize_duration_ms"
        )]
        max_delay: Duration,
    },
}

/// 上传配置，单个会话内不可变
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// 分块大小
    pub chunk_size_bytes: u64,
    /// 每个分块的最大重试次数
    pub retry_count: u32,
    /// 重试间隔
    #[serde(
        rename = "retry_delay_ms",
        serialize_with = "serialize_duration_ms",
        deserialize_with = "deserialize_duration_ms"
    )]
    pub retry_delay: Duration,
    /// 声明的并发数，分块始终串行上传
    pub max_concurrent_uploads: usize,
    pub retry_backoff: RetryBackoff,
    /// 单次上传时模拟进度的步数
    pub single_shot_ticks: u32,
    #[serde(
        rename = "tick_interval_ms",
        serialize_with = "serialize_duration_ms",
        deserialize_with = "deserialize_duration_ms"
    )]
    pub tick_interval: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 5 * 1024 * 1024, // 5MB
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            max_concurrent_uploads: 1,
            retry_backoff: RetryBackoff::Fixed,
            single_shot_ticks: 10,
            tick_interval: Duration::from_millis(300),
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            return Err(UploadError::InvalidConfig("chunk_size_bytes must be positive".to_string()));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(UploadError::InvalidConfig(
                "max_concurrent_uploads must be at least 1".to_string(),
            ));
        }
        if let RetryBackoff::Exponential { multiplier, .. } = self.retry_backoff {
            if !(multiplier >= 1.0) {
                return Err(UploadError::InvalidConfig("retry multiplier must be >= 1".to_string()));
            }
        }
        Ok(())
    }

    pub fn retry_strategy(&self) -> RetryStrategy {
        match &self.retry_backoff {
            RetryBackoff::Fixed => RetryStrategy::Fixed(self.retry_delay),
            RetryBackoff::Exponential { multiplier, max_delay } => RetryStrategy::Exponential {
                initial: self.retry_delay,
                multiplier: *multiplier,
                max_delay: *max_delay,
            },
        }
    }
}

/// 缩略图配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// 候选尺寸 (宽, 高)
    pub target_dimensions: Vec<(u32, u32)>,
    /// 有损编码质量 (0, 1]
    pub quality: f32,
    #[serde(
        rename = "video_seek_timeout_ms",
        serialize_with = "serialize_duration_ms",
        deserialize_with = "deserialize_duration_ms"
    )]
    pub video_seek_timeout: Duration,
    /// 视频帧留边的背景色
    pub background: [u8; 3],
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            target_dimensions: vec![(480, 360), (360, 480)],
            quality: 0.8,
            video_seek_timeout: Duration::from_secs(5),
            background: [0, 0, 0],
        }
    }
}

impl ThumbnailConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_dimensions.is_empty() {
            return Err(UploadError::InvalidConfig("target_dimensions is empty".to_string()));
        }
        if self.target_dimensions.iter().any(|&(w, h)| w == 0 || h == 0) {
            return Err(UploadError::InvalidConfig(
                "thumbnail dimensions must be positive".to_string(),
            ));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(UploadError::InvalidConfig("quality must be in (0, 1]".to_string()));
        }
        Ok(())
    }

    /// Pick the candidate whose orientation matches the source, else the first one.
    pub fn bounds_for(&self, width: u32, height: u32) -> (u32, u32) {
        let landscape = width >= height;
        self.target_dimensions
            .iter()
            .copied()
            .find(|&(w, h)| (w >= h) == landscape)
            .or_else(|| self.target_dimensions.first().copied())
            .unwrap_or((480, 360))
    }
}

/// 媒体元数据
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MediaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
}

/// 编码后的预览图
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub data: Bytes,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl PreviewImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

/// 分块计划
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_chunks: u64,
    pub chunks_uploaded: u64,
    pub next_chunk_index: u64,
    /// 实际生效的分块大小（服务端可能调整）
    pub chunk_size_bytes: u64,
}

impl ChunkPlan {
    pub fn new(size_bytes: u64, chunk_size_bytes: u64) -> Self {
        Self {
            total_chunks: total_chunks(size_bytes, chunk_size_bytes),
            chunks_uploaded: 0,
            next_chunk_index: 0,
            chunk_size_bytes,
        }
    }

    /// 第 `index` 个分块的字节范围
    pub fn chunk_range(&self, index: u64, size_bytes: u64) -> (u64, u64) {
        let start = index.saturating_mul(self.chunk_size_bytes).min(size_bytes);
        let end = start.saturating_add(self.chunk_size_bytes).min(size_bytes);
        (start, end)
    }
}

/// `ceil(size / chunk)`
pub fn total_chunks(size_bytes: u64, chunk_size_bytes: u64) -> u64 {
    if chunk_size_bytes == 0 {
        return 0;
    }
    size_bytes.div_ceil(chunk_size_bytes)
}

/// Result of a successful finalize call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteFile {
    pub file_url: String,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// 文件描述符：身份、派生信息与传输状态
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub extension: String,
    pub last_modified: DateTime<Utc>,
    /// 仅被拒绝文件的临时描述符为 `None`
    pub category: Option<FileCategory>,

    pub preview: Option<PreviewImage>,
    pub metadata: Option<MediaMetadata>,

    pub status: UploadStatus,
    pub progress_percent: u8,
    pub upload_id: Option<String>,
    pub last_error: Option<String>,
    pub chunk_plan: Option<ChunkPlan>,
    pub remote: Option<RemoteFile>,
}

impl FileDescriptor {
    pub fn new(
        name: impl Into<String>,
        size_bytes: u64,
        mime_type: impl Into<String>,
        extension: impl Into<String>,
        last_modified: DateTime<Utc>,
        category: Option<FileCategory>,
    ) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
            extension: extension.into(),
            last_modified,
            category,
            preview: None,
            metadata: None,
            status: UploadStatus::Pending,
            progress_percent: 0,
            upload_id: None,
            last_error: None,
            chunk_plan: None,
            remote: None,
        }
    }

    /// 清空传输状态，回到 pending
    pub(crate) fn clear_transfer(&mut self) {
        self.status = UploadStatus::Pending;
        self.progress_percent = 0;
        self.upload_id = None;
        self.last_error = None;
        self.chunk_plan = None;
        self.remote = None;
    }
}

/// `start` / `resume` 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Completed(RemoteFile),
    Cancelled,
}

// 静态断言确保类型是 Send 的
#[allow(dead_code)]
const _: () = {
    fn assert_send<T: Send + Sync>() {}
    fn assert_types() {
        assert_send::<FileDescriptor>();
        assert_send::<UploadConfig>();
        assert_send::<UploadOutcome>();
    }
};
