use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use super::errors::{Result, UploadError};
use super::types::{FileDescriptor, MediaMetadata, PreviewImage, RemoteFile, UploadStatus};

/// 创建上传会话请求
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// 客户端期望的分块大小
    pub chunk_size_bytes: u64,
    /// 仅单次上传时携带
    pub preview: Option<PreviewImage>,
    pub metadata: Option<MediaMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InitiateResponse {
    pub upload_id: String,
    /// 服务端可以覆盖请求的分块大小
    #[serde(default)]
    pub chunk_size_bytes: Option<u64>,
}

/// 分块上传请求
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub upload_id: String,
    pub chunk_index: u64,
    pub data: Bytes,
    pub total_chunks: u64,
    /// 仅第 0 块携带
    pub preview: Option<PreviewImage>,
    pub metadata: Option<MediaMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkResponse {
    pub chunk_index: u64,
    pub received: bool,
    /// 服务端期望的下一块，优先于本地递增
    #[serde(default)]
    pub next_expected_index: Option<u64>,
}

/// 完成上传请求
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub upload_id: String,
    pub name: String,
    pub total_chunks: u64,
    pub descriptor: Option<FileDescriptor>,
}

/// 传输适配器 - 引擎唯一依赖的网络边界
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// 创建上传会话
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiateResponse>;

    /// 上传单个分块，失败由调用方重试
    async fn upload_chunk(&self, request: ChunkRequest) -> Result<ChunkResponse>;

    /// 完成上传
    async fn finalize(&self, request: FinalizeRequest) -> Result<RemoteFile>;
}

/// 上传事件回调，所有方法默认为空实现
///
/// 回调在会话锁之外调用，可以安全地读取会话快照。
pub trait UploadObserver: Send + Sync {
    /// 进度更新回调
    fn on_progress(&self, _percent: u8, _descriptor: &FileDescriptor) {}

    /// 上传完成回调
    fn on_complete(&self, _descriptor: &FileDescriptor) {}

    /// 上传失败回调，取消不会触发
    fn on_error(&self, _error: &UploadError, _descriptor: &FileDescriptor) {}

    /// 状态变更回调
    fn on_state_change(&self, _from: UploadStatus, _to: UploadStatus) {}
}

pub struct NoopObserver;

impl UploadObserver for NoopObserver {}
