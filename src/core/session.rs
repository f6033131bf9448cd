use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::media::MediaProcessor;
use crate::utils::retry::{retry_with_config, RetryConfig};
use crate::validation::{guess_mime_type, FileValidator};
use super::cancel::AttemptToken;
use super::errors::{Result, UploadError};
use super::progress::{tick_percent, ProgressReporter};
use super::scheduler::{ChunkJob, ChunkScheduler};
use super::source::SourceFile;
use super::traits::{
    ChunkRequest, FinalizeRequest, InitiateRequest, NoopObserver, TransportAdapter, UploadObserver,
};
use super::types::{
    ChunkPlan, FileCategory, FileDescriptor, RemoteFile, UploadConfig, UploadOutcome, UploadStatus,
};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

struct SessionState {
    descriptor: Option<FileDescriptor>,
    source: Option<Arc<SourceFile>>,
    token: AttemptToken,
    /// 每次开始、取消、重置都会递增
    attempt: u64,
    force_chunked: bool,
}

struct SessionInner {
    config: UploadConfig,
    transport: Arc<dyn TransportAdapter>,
    processor: Option<MediaProcessor>,
    validator: FileValidator,
    observer: Arc<dyn UploadObserver>,
    state: Mutex<SessionState>,
}

/// 单文件上传会话
///
/// Cloning yields another handle to the same session, so `pause`, `cancel`
/// and `reset` can be called while `start` is still awaiting elsewhere.
#[derive(Clone)]
pub struct UploadSession {
    inner: Arc<SessionInner>,
}

pub struct UploadSessionBuilder {
    transport: Arc<dyn TransportAdapter>,
    config: UploadConfig,
    processor: Option<MediaProcessor>,
    validator: FileValidator,
    observer: Arc<dyn UploadObserver>,
}

impl UploadSessionBuilder {
    pub fn config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn media_processor(mut self, processor: MediaProcessor) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn validator(mut self, validator: FileValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> Result<UploadSession> {
        self.config.validate()?;
        if let Some(processor) = &self.processor {
            processor.config().validate()?;
        }
        if self.config.max_concurrent_uploads > 1 {
            tracing::debug!(
                max_concurrent_uploads = self.config.max_concurrent_uploads,
                "Chunks are uploaded one at a time regardless of max_concurrent_uploads"
            );
        }

        Ok(UploadSession {
            inner: Arc::new(SessionInner {
                config: self.config,
                transport: self.transport,
                processor: self.processor,
                validator: self.validator,
                observer: self.observer,
                state: Mutex::new(SessionState {
                    descriptor: None,
                    source: None,
                    token: AttemptToken::new(0),
                    attempt: 0,
                    force_chunked: false,
                }),
            }),
        })
    }
}

/// `begin_attempt` 的结果
struct Attempt {
    token: AttemptToken,
    source: Arc<SourceFile>,
    descriptor: FileDescriptor,
    force_chunked: bool,
}

impl UploadSession {
    pub fn builder(transport: Arc<dyn TransportAdapter>) -> UploadSessionBuilder {
        UploadSessionBuilder {
            transport,
            config: UploadConfig::default(),
            processor: None,
            validator: FileValidator::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.inner.config
    }

    /// 当前文件描述符的快照
    pub fn snapshot(&self) -> Option<FileDescriptor> {
        self.lock().descriptor.clone()
    }

    pub fn status(&self) -> Option<UploadStatus> {
        self.lock().descriptor.as_ref().map(|d| d.status)
    }

    /// Validates `source`, derives preview and metadata, and makes it the
    /// session's file in `Pending` state.
    ///
    /// A rejected file leaves the session untouched; `on_error` receives a
    /// transient descriptor for it.
    pub async fn select_file(
        &self,
        source: SourceFile,
        accepted: &[FileCategory],
    ) -> Result<FileDescriptor> {
        let attempt = {
            let state = self.lock();
            if let Some(descriptor) = &state.descriptor {
                return Err(UploadError::InvalidTransition {
                    from: descriptor.status,
                    action: "select another file",
                });
            }
            state.attempt
        };

        let mime_type = source
            .mime_type()
            .map(str::to_string)
            .or_else(|| guess_mime_type(&source.extension()).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let category = match self.inner.validator.validate(&source, accepted) {
            Ok(category) => category,
            Err(err) => {
                let rejected = FileDescriptor::new(
                    source.name(),
                    source.size_bytes(),
                    mime_type,
                    source.extension(),
                    source.last_modified(),
                    None,
                );
                let err = UploadError::Validation(err);
                tracing::info!(file = source.name(), error = %err, "File rejected");
                self.inner.observer.on_error(&err, &rejected);
                return Err(err);
            }
        };

        let mut descriptor = FileDescriptor::new(
            source.name(),
            source.size_bytes(),
            mime_type,
            source.extension(),
            source.last_modified(),
            Some(category),
        );

        if let Some(processor) = &self.inner.processor {
            let output = processor.process(&source, category).await;
            descriptor.preview = output.preview;
            descriptor.metadata = output.metadata;
        }

        let mut state = self.lock();
        // 处理期间被 reset 或已选择了其他文件
        if state.attempt != attempt || state.descriptor.is_some() {
            return Err(UploadError::Aborted);
        }
        tracing::info!(
            file = %descriptor.name,
            size = descriptor.size_bytes,
            %category,
            "File accepted"
        );
        state.descriptor = Some(descriptor.clone());
        state.source = Some(Arc::new(source));
        Ok(descriptor)
    }

    /// `pending | error -> uploading`
    pub async fn start(&self, force_chunked: bool) -> Result<UploadOutcome> {
        let allowed = [UploadStatus::Pending, UploadStatus::Error];
        let attempt = self.begin_attempt(&allowed, "start", Some(force_chunked))?;
        self.run_attempt(attempt).await
    }

    /// `paused -> uploading`. The transfer restarts from the first byte.
    pub async fn resume(&self) -> Result<UploadOutcome> {
        let attempt = self.begin_attempt(&[UploadStatus::Paused], "resume", None)?;
        self.run_attempt(attempt).await
    }

    /// `uploading -> paused`. In-flight work is not interrupted.
    pub fn pause(&self) -> Result<()> {
        {
            let mut state = self.lock();
            let descriptor = state.descriptor.as_mut().ok_or(UploadError::NoFile)?;
            if descriptor.status != UploadStatus::Uploading {
                return Err(UploadError::InvalidTransition {
                    from: descriptor.status,
                    action: "pause",
                });
            }
            descriptor.status = UploadStatus::Paused;
        }

        tracing::info!("Upload paused");
        self.transition(UploadStatus::Uploading, UploadStatus::Paused);
        Ok(())
    }

    /// Aborts the current attempt and returns to `pending` with zero progress.
    ///
    /// No-op when already pending or when no file is selected.
    pub fn cancel(&self) -> Result<()> {
        let from = {
            let mut state = self.lock();
            let from = match state.descriptor.as_ref().map(|d| d.status) {
                None | Some(UploadStatus::Pending) => return Ok(()),
                Some(UploadStatus::Completed) => {
                    return Err(UploadError::InvalidTransition {
                        from: UploadStatus::Completed,
                        action: "cancel",
                    });
                }
                Some(status) => status,
            };

            Self::invalidate_attempt(&mut state);
            if let Some(descriptor) = state.descriptor.as_mut() {
                descriptor.clear_transfer();
            }
            from
        };

        tracing::info!(%from, "Upload cancelled");
        self.transition(from, UploadStatus::Pending);
        Ok(())
    }

    /// 丢弃当前文件，回到未选择文件的状态
    pub fn reset(&self) {
        let mut state = self.lock();
        Self::invalidate_attempt(&mut state);
        state.descriptor = None;
        state.source = None;
        state.force_chunked = false;
    }

    fn transition(&self, from: UploadStatus, to: UploadStatus) {
        debug_assert!(UploadStatus::is_valid_transition(from, to), "{from} -> {to}");
        self.inner.observer.on_state_change(from, to);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate_attempt(state: &mut SessionState) {
        state.token.cancel();
        state.attempt += 1;
        state.token = AttemptToken::new(state.attempt);
    }

    fn begin_attempt(
        &self,
        allowed: &[UploadStatus],
        action: &'static str,
        force_chunked: Option<bool>,
    ) -> Result<Attempt> {
        let (attempt, from) = {
            let mut state = self.lock();
            let from = state.descriptor.as_ref().map(|d| d.status).ok_or(UploadError::NoFile)?;
            if !allowed.contains(&from) {
                return Err(UploadError::InvalidTransition { from, action });
            }
            let source = state.source.clone().ok_or(UploadError::NoFile)?;

            Self::invalidate_attempt(&mut state);
            if let Some(force) = force_chunked {
                state.force_chunked = force;
            }
            let token = state.token.clone();
            let force_chunked = state.force_chunked;

            let descriptor = state.descriptor.as_mut().ok_or(UploadError::NoFile)?;
            descriptor.clear_transfer();
            descriptor.status = UploadStatus::Uploading;

            let attempt = Attempt {
                token,
                source,
                descriptor: descriptor.clone(),
                force_chunked,
            };
            (attempt, from)
        };

        tracing::info!(
            file = %attempt.descriptor.name,
            attempt = attempt.token.attempt(),
            %from,
            "Upload attempt started"
        );
        self.transition(from, UploadStatus::Uploading);
        Ok(attempt)
    }

    async fn run_attempt(&self, attempt: Attempt) -> Result<UploadOutcome> {
        let chunked = attempt.force_chunked
            || attempt.descriptor.size_bytes > self.inner.config.chunk_size_bytes;

        // 同一次尝试内进度只增不减，finalize 成功后才到 100
        let mut reporter = ProgressReporter::new();
        let result = if chunked {
            self.run_chunked(&attempt, &mut reporter).await
        } else {
            self.run_single_shot(&attempt, &mut reporter).await
        };

        let result = match result {
            Ok(remote) => self.complete(&attempt.token, remote, &mut reporter),
            Err(err) => Err(err),
        };

        match result {
            Ok(remote) => Ok(UploadOutcome::Completed(remote)),
            Err(UploadError::Aborted) => {
                tracing::debug!(
                    attempt = attempt.token.attempt(),
                    progress = reporter.last(),
                    "Upload attempt aborted"
                );
                Ok(UploadOutcome::Cancelled)
            }
            Err(err) => self.fail(&attempt.token, err),
        }
    }

    async fn initiate(&self, attempt: &Attempt, with_payload: bool) -> Result<(String, u64)> {
        let descriptor = &attempt.descriptor;
        let request = InitiateRequest {
            name: descriptor.name.clone(),
            size_bytes: descriptor.size_bytes,
            mime_type: descriptor.mime_type.clone(),
            chunk_size_bytes: self.inner.config.chunk_size_bytes,
            preview: descriptor.preview.clone().filter(|_| with_payload),
            metadata: descriptor.metadata.clone().filter(|_| with_payload),
        };

        let config = &self.inner.config;
        let retry = RetryConfig::new("initiate", config.retry_count, config.retry_strategy());
        let transport = &self.inner.transport;
        let response =
            retry_with_config(retry, &attempt.token, || transport.initiate(request.clone())).await?;

        let chunk_size = response
            .chunk_size_bytes
            .filter(|size| *size > 0)
            .unwrap_or(self.inner.config.chunk_size_bytes);
        if chunk_size != self.inner.config.chunk_size_bytes {
            tracing::info!(
                upload_id = %response.upload_id,
                requested = self.inner.config.chunk_size_bytes,
                chunk_size,
                "Server adjusted chunk size"
            );
        }

        let upload_id = response.upload_id;
        self.update(&attempt.token, |d| d.upload_id = Some(upload_id.clone()))?;
        Ok((upload_id, chunk_size))
    }

    async fn run_chunked(
        &self,
        attempt: &Attempt,
        reporter: &mut ProgressReporter,
    ) -> Result<RemoteFile> {
        let (upload_id, chunk_size) = self.initiate(attempt, false).await?;

        let plan = ChunkPlan::new(attempt.descriptor.size_bytes, chunk_size);
        self.update(&attempt.token, |d| d.chunk_plan = Some(plan))?;
        tracing::debug!(
            %upload_id,
            total_chunks = plan.total_chunks,
            chunk_size,
            "Chunk plan ready"
        );

        let scheduler = ChunkScheduler::new(
            self.inner.transport.as_ref(),
            attempt.source.as_ref(),
            &attempt.token,
            self.inner.config.retry_count,
            self.inner.config.retry_strategy(),
        );
        let job = ChunkJob {
            upload_id: upload_id.clone(),
            plan,
            preview: attempt.descriptor.preview.clone(),
            metadata: attempt.descriptor.metadata.clone(),
        };

        let plan = scheduler
            .run(job, |ack| {
                let percent = reporter.advance(ack.percent);
                let snapshot = self.update(&attempt.token, |d| {
                    d.chunk_plan = Some(ack.plan);
                    d.progress_percent = percent;
                })?;
                self.inner.observer.on_progress(percent, &snapshot);
                Ok(())
            })
            .await?;

        self.finalize(attempt, upload_id, plan.total_chunks).await
    }

    async fn run_single_shot(
        &self,
        attempt: &Attempt,
        reporter: &mut ProgressReporter,
    ) -> Result<RemoteFile> {
        let (upload_id, _) = self.initiate(attempt, true).await?;
        let token = &attempt.token;
        let config = &self.inner.config;

        // 整个文件作为唯一的分块发送
        let transfer = async {
            let data = attempt.source.read_all().await?;
            let retry = RetryConfig::new("upload", config.retry_count, config.retry_strategy());
            let transport = &self.inner.transport;
            let upload_id = upload_id.clone();
            retry_with_config(retry, token, || {
                transport.upload_chunk(ChunkRequest {
                    upload_id: upload_id.clone(),
                    chunk_index: 0,
                    data: data.clone(),
                    total_chunks: 1,
                    preview: None,
                    metadata: None,
                })
            })
            .await
            .and_then(|response| {
                if response.received {
                    Ok(())
                } else {
                    Err(UploadError::NotReceived { chunk_index: 0 })
                }
            })
        };

        // 模拟进度：固定步数，最高到 90
        let ticks = async {
            for tick in 1..=config.single_shot_ticks {
                token.sleep(config.tick_interval).await?;
                let percent = reporter.advance(tick_percent(tick, config.single_shot_ticks));
                let snapshot = self.update(token, |d| d.progress_percent = percent)?;
                self.inner.observer.on_progress(percent, &snapshot);
            }
            Ok::<_, UploadError>(())
        };

        tokio::try_join!(transfer, ticks)?;

        self.finalize(attempt, upload_id, 1).await
    }

    async fn finalize(
        &self,
        attempt: &Attempt,
        upload_id: String,
        total_chunks: u64,
    ) -> Result<RemoteFile> {
        let descriptor = self.current(&attempt.token)?;
        let request = FinalizeRequest {
            upload_id: upload_id.clone(),
            name: descriptor.name.clone(),
            total_chunks,
            descriptor: Some(descriptor),
        };

        match attempt.token.guard(self.inner.transport.finalize(request)).await {
            Ok(remote) => Ok(remote),
            Err(UploadError::Aborted) => Err(UploadError::Aborted),
            Err(err) => Err(UploadError::Finalize(Box::new(err))),
        }
    }

    fn complete(
        &self,
        token: &AttemptToken,
        remote: RemoteFile,
        reporter: &mut ProgressReporter,
    ) -> Result<RemoteFile> {
        let mut from = UploadStatus::Uploading;
        let snapshot = self.update(token, |d| {
            from = d.status;
            d.status = UploadStatus::Completed;
            d.progress_percent = reporter.complete();
            d.upload_id = Some(remote.file_id.clone());
            d.last_error = None;
            d.remote = Some(remote.clone());
        })?;

        tracing::info!(
            file = %snapshot.name,
            file_id = %remote.file_id,
            url = %remote.file_url,
            "Upload completed"
        );
        self.inner.observer.on_progress(snapshot.progress_percent, &snapshot);
        self.transition(from, UploadStatus::Completed);
        self.inner.observer.on_complete(&snapshot);
        Ok(remote)
    }

    fn fail(&self, token: &AttemptToken, err: UploadError) -> Result<UploadOutcome> {
        let mut from = UploadStatus::Uploading;
        let message = err.to_string();
        let snapshot = match self.update(token, |d| {
            from = d.status;
            d.status = UploadStatus::Error;
            d.last_error = Some(message.clone());
        }) {
            Ok(snapshot) => snapshot,
            // 过期尝试的失败不影响当前描述符
            Err(_) => return Ok(UploadOutcome::Cancelled),
        };

        tracing::error!(file = %snapshot.name, error = %err, "Upload failed");
        self.transition(from, UploadStatus::Error);
        self.inner.observer.on_error(&err, &snapshot);
        Err(err)
    }

    fn current(&self, token: &AttemptToken) -> Result<FileDescriptor> {
        self.update(token, |_| {})
    }

    /// 仅当 `token` 仍是当前尝试时修改描述符，返回修改后的快照
    fn update<F>(&self, token: &AttemptToken, f: F) -> Result<FileDescriptor>
    where
        F: FnOnce(&mut FileDescriptor),
    {
        let mut state = self.lock();
        if state.attempt != token.attempt() || token.is_cancelled() {
            return Err(UploadError::Aborted);
        }
        let descriptor = state.descriptor.as_mut().ok_or(UploadError::Aborted)?;
        f(descriptor);
        Ok(descriptor.clone())
    }
}
