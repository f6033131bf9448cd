use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use uuid::Uuid;
use crate::core::{
    ChunkRequest,
    ChunkResponse,
    FinalizeRequest,
    InitiateRequest,
    InitiateResponse,
    RemoteFile,
    Result,
    TransportAdapter,
    UploadError,
};

/// 调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Initiate {
        name: String,
        size_bytes: u64,
        with_preview: bool,
    },
    Chunk {
        upload_id: String,
        chunk_index: u64,
        len: usize,
        with_preview: bool,
    },
    Finalize {
        upload_id: String,
        total_chunks: u64,
    },
}

#[derive(Default)]
struct PendingUpload {
    name: String,
    chunks: BTreeMap<u64, Bytes>,
    /// 服务端声明已持有、客户端会跳过的分块
    skipped: HashSet<u64>,
    has_preview: bool,
}

#[derive(Default)]
struct MemoryState {
    uploads: HashMap<String, PendingUpload>,
    files: HashMap<String, Bytes>,
    calls: Vec<TransportCall>,

    initiate_failures: u32,
    chunk_failures: HashMap<u64, u32>,
    dropped_chunks: HashMap<u64, u32>,
    next_index_overrides: HashMap<u64, u64>,
    finalize_failure: Option<u16>,
    chunk_size_override: Option<u64>,
}

/// 内存中的传输实现，可以注入故障
///
/// Chunks are assembled into a file on `finalize`; the result is available
/// through [`MemoryTransport::file`].
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用前的模拟延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_initiate(&self, times: u32) {
        self.lock().initiate_failures = times;
    }

    /// 分块 `index` 的前 `times` 次上传返回 503
    pub fn fail_chunk(&self, index: u64, times: u32) {
        self.lock().chunk_failures.insert(index, times);
    }

    /// 分块 `index` 的前 `times` 次上传返回 `received: false`
    pub fn drop_chunk(&self, index: u64, times: u32) {
        self.lock().dropped_chunks.insert(index, times);
    }

    /// 确认分块 `after` 后要求客户端从 `next` 继续
    pub fn skip_after(&self, after: u64, next: u64) {
        self.lock().next_index_overrides.insert(after, next);
    }

    pub fn fail_finalize(&self, status: u16) {
        self.lock().finalize_failure = Some(status);
    }

    pub fn override_chunk_size(&self, chunk_size_bytes: u64) {
        self.lock().chunk_size_override = Some(chunk_size_bytes);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// 按顺序返回所有分块调用的下标
    pub fn chunk_indices(&self) -> Vec<u64> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Chunk { chunk_index, .. } => Some(*chunk_index),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::Finalize { .. }))
            .count()
    }

    /// 已完成文件的内容
    pub fn file(&self, file_id: &str) -> Option<Bytes> {
        self.lock().files.get(file_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn take_fault(faults: &mut HashMap<u64, u32>, index: u64) -> bool {
        match faults.get_mut(&index) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

fn unknown_upload(upload_id: &str) -> UploadError {
    UploadError::server_error(404, format!("unknown upload {upload_id}"))
}

#[async_trait]
impl TransportAdapter for MemoryTransport {
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiateResponse> {
        self.delay().await;

        let mut state = self.lock();
        state.calls.push(TransportCall::Initiate {
            name: request.name.clone(),
            size_bytes: request.size_bytes,
            with_preview: request.preview.is_some(),
        });

        if state.initiate_failures > 0 {
            state.initiate_failures -= 1;
            return Err(UploadError::server_error(503, "initiate unavailable"));
        }

        let upload_id = Uuid::new_v4().to_string();
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                name: request.name,
                has_preview: request.preview.is_some(),
                ..Default::default()
            },
        );

        Ok(InitiateResponse {
            upload_id,
            chunk_size_bytes: state.chunk_size_override,
        })
    }

    async fn upload_chunk(&self, request: ChunkRequest) -> Result<ChunkResponse> {
        self.delay().await;

        let mut state = self.lock();
        let index = request.chunk_index;
        state.calls.push(TransportCall::Chunk {
            upload_id: request.upload_id.clone(),
            chunk_index: index,
            len: request.data.len(),
            with_preview: request.preview.is_some(),
        });

        if Self::take_fault(&mut state.chunk_failures, index) {
            return Err(UploadError::server_error(503, format!("chunk {index} rejected")));
        }
        if Self::take_fault(&mut state.dropped_chunks, index) {
            return Ok(ChunkResponse {
                chunk_index: index,
                received: false,
                next_expected_index: None,
            });
        }

        let next_expected_index = state.next_index_overrides.get(&index).copied();
        let upload = state
            .uploads
            .get_mut(&request.upload_id)
            .ok_or_else(|| unknown_upload(&request.upload_id))?;

        upload.chunks.insert(index, request.data);
        upload.has_preview |= request.preview.is_some();
        if let Some(next) = next_expected_index {
            upload.skipped.extend(index + 1..next);
        }

        Ok(ChunkResponse {
            chunk_index: index,
            received: true,
            next_expected_index,
        })
    }

    async fn finalize(&self, request: FinalizeRequest) -> Result<RemoteFile> {
        self.delay().await;

        let mut state = self.lock();
        state.calls.push(TransportCall::Finalize {
            upload_id: request.upload_id.clone(),
            total_chunks: request.total_chunks,
        });

        if let Some(status) = state.finalize_failure {
            return Err(UploadError::server_error(status, "finalize rejected"));
        }

        let upload = state
            .uploads
            .remove(&request.upload_id)
            .ok_or_else(|| unknown_upload(&request.upload_id))?;

        if let Some(missing) = (0..request.total_chunks)
            .find(|i| !upload.chunks.contains_key(i) && !upload.skipped.contains(i))
        {
            return Err(UploadError::server_error(409, format!("chunk {missing} missing")));
        }

        let mut data = BytesMut::new();
        for chunk in upload.chunks.values() {
            data.extend_from_slice(chunk);
        }

        let file_id = format!("file-{}", request.upload_id);
        let remote = RemoteFile {
            file_url: format!("memory://files/{file_id}/{}", upload.name),
            file_id: file_id.clone(),
            thumbnail_url: upload
                .has_preview
                .then(|| format!("memory://thumbnails/{file_id}.jpg")),
        };
        state.files.insert(file_id, data.freeze());

        Ok(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(upload_id: &str, index: u64, data: &'static [u8]) -> ChunkRequest {
        ChunkRequest {
            upload_id: upload_id.to_string(),
            chunk_index: index,
            data: Bytes::from_static(data),
            total_chunks: 2,
            preview: None,
            metadata: None,
        }
    }

    fn initiate() -> InitiateRequest {
        InitiateRequest {
            name: "notes.txt".to_string(),
            size_bytes: 6,
            mime_type: "text/plain".to_string(),
            chunk_size_bytes: 3,
            preview: None,
            metadata: None,
        }
    }

    fn finalize(upload_id: &str) -> FinalizeRequest {
        FinalizeRequest {
            upload_id: upload_id.to_string(),
            name: "notes.txt".to_string(),
            total_chunks: 2,
            descriptor: None,
        }
    }

    #[tokio::test]
    async fn test_assembles_chunks() {
        let transport = MemoryTransport::new();
        let upload_id = transport.initiate(initiate()).await.unwrap().upload_id;

        transport.upload_chunk(chunk(&upload_id, 0, b"abc")).await.unwrap();
        transport.upload_chunk(chunk(&upload_id, 1, b"def")).await.unwrap();
        let remote = transport.finalize(finalize(&upload_id)).await.unwrap();

        assert_eq!(transport.file(&remote.file_id).unwrap().as_ref(), b"abcdef");
        assert!(remote.file_url.ends_with("/notes.txt"));
        assert_eq!(remote.thumbnail_url, None);
        assert_eq!(transport.chunk_indices(), vec![0, 1]);
        assert_eq!(transport.finalize_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_faults() {
        let transport = MemoryTransport::new();
        transport.fail_chunk(1, 1);
        transport.drop_chunk(0, 1);
        let upload_id = transport.initiate(initiate()).await.unwrap().upload_id;

        let dropped = transport.upload_chunk(chunk(&upload_id, 0, b"abc")).await.unwrap();
        assert!(!dropped.received);
        assert!(transport.upload_chunk(chunk(&upload_id, 0, b"abc")).await.unwrap().received);

        let failed = transport.upload_chunk(chunk(&upload_id, 1, b"def")).await;
        assert!(matches!(failed, Err(UploadError::Server { status: 503, .. })));
        assert!(transport.upload_chunk(chunk(&upload_id, 1, b"def")).await.is_ok());
    }

    #[tokio::test]
    async fn test_finalize_rejects_missing_chunk() {
        let transport = MemoryTransport::new();
        let upload_id = transport.initiate(initiate()).await.unwrap().upload_id;
        transport.upload_chunk(chunk(&upload_id, 0, b"abc")).await.unwrap();

        let result = transport.finalize(finalize(&upload_id)).await;
        assert!(matches!(result, Err(UploadError::Server { status: 409, .. })));
    }

    #[tokio::test]
    async fn test_skipped_chunks_count_as_present() {
        let transport = MemoryTransport::new();
        transport.skip_after(0, 2);
        let upload_id = transport.initiate(initiate()).await.unwrap().upload_id;

        let response = transport.upload_chunk(chunk(&upload_id, 0, b"abc")).await.unwrap();
        assert_eq!(response.next_expected_index, Some(2));
        assert!(transport.finalize(finalize(&upload_id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_chunk_size_override_and_initiate_failure() {
        let transport = MemoryTransport::new();
        transport.fail_initiate(1);
        transport.override_chunk_size(1024);

        assert!(transport.initiate(initiate()).await.is_err());
        let response = transport.initiate(initiate()).await.unwrap();
        assert_eq!(response.chunk_size_bytes, Some(1024));
    }
}
