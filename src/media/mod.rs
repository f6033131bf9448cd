//! Pre-upload media pipeline: preview generation and metadata extraction.
//!
//! Processing is best effort. [`MediaProcessor::process`] never fails; a
//! missing preview must not block the upload.

pub mod geometry;
pub mod sampler;

use std::sync::Arc;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use thiserror::Error;
use crate::core::{FileCategory, MediaMetadata, PreviewImage, SourceFile, ThumbnailConfig};
use self::geometry::{fit_within, letterbox, seek_position};

pub use sampler::{FrameSampler, ImageFrameSampler, VideoProbe, VideoSource};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Unsupported media: {0}")]
    Unsupported(String),

    #[error("Media processing timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(String),
}

/// 处理结果，两项都可能缺失
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaOutput {
    pub preview: Option<PreviewImage>,
    pub metadata: Option<MediaMetadata>,
}

/// 媒体处理器
pub struct MediaProcessor {
    sampler: Arc<dyn FrameSampler>,
    config: ThumbnailConfig,
}

impl MediaProcessor {
    pub fn new(sampler: Arc<dyn FrameSampler>, config: ThumbnailConfig) -> Self {
        Self { sampler, config }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub async fn process(&self, source: &SourceFile, category: FileCategory) -> MediaOutput {
        let result = match category {
            FileCategory::Image => self.process_image(source).await,
            FileCategory::Video => self.process_video(source).await,
            _ => return MediaOutput::default(),
        };

        match result {
            Ok(output) => {
                tracing::debug!(
                    file = source.name(),
                    %category,
                    has_preview = output.preview.is_some(),
                    "Media processed"
                );
                output
            }
            Err(err) => {
                tracing::warn!(
                    file = source.name(),
                    %category,
                    error = %err,
                    "Media processing failed, uploading without preview"
                );
                MediaOutput::default()
            }
        }
    }

    async fn process_image(&self, source: &SourceFile) -> Result<MediaOutput, MediaError> {
        let data = source
            .read_all()
            .await
            .map_err(|err| MediaError::Io(err.to_string()))?;
        let frame = self.sampler.decode_image(data).await?;
        let (width, height) = frame.dimensions();

        let (max_width, max_height) = self.config.bounds_for(width, height);
        let (target_width, target_height) = fit_within(width, height, max_width, max_height);
        let scaled = if (target_width, target_height) == (width, height) {
            frame
        } else {
            run_blocking(move || {
                imageops::resize(&frame, target_width, target_height, FilterType::Triangle)
            })
            .await?
        };

        let preview = self.sampler.encode_raster(scaled, self.config.quality).await?;

        Ok(MediaOutput {
            preview: Some(preview),
            metadata: Some(MediaMetadata {
                width: Some(width),
                height: Some(height),
                ..Default::default()
            }),
        })
    }

    async fn process_video(&self, source: &SourceFile) -> Result<MediaOutput, MediaError> {
        let timeout = self.config.video_seek_timeout;

        // 超时时整个 future 被丢弃，解码句柄随之释放
        let (probe, frame) = tokio::time::timeout(timeout, async {
            let mut video = self.sampler.open_video(source).await?;
            let probe = video.probe().await?;
            let frame = video.sample_frame(seek_position(probe.duration_seconds)).await?;
            Ok::<_, MediaError>((probe, frame))
        })
        .await
        .map_err(|_| MediaError::Timeout(timeout))??;

        let (canvas_width, canvas_height) = self.config.bounds_for(probe.width, probe.height);
        let background = self.config.background;
        let canvas = run_blocking(move || {
            letterboxed(&frame, background, canvas_width, canvas_height)
        })
        .await?;
        let preview = self.sampler.encode_raster(canvas, self.config.quality).await?;

        Ok(MediaOutput {
            preview: Some(preview),
            metadata: Some(MediaMetadata {
                width: Some(probe.width),
                height: Some(probe.height),
                duration_seconds: Some(probe.duration_seconds),
                codec: probe.codec,
                bitrate: probe.bitrate,
                frame_rate: probe.frame_rate,
            }),
        })
    }
}

/// 缩放在阻塞线程池上执行，不占用异步运行时
async fn run_blocking<F>(f: F) -> Result<RgbaImage, MediaError>
where
    F: FnOnce() -> RgbaImage + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| MediaError::Encode(format!("resize task panicked: {err}")))
}

fn letterboxed(
    frame: &RgbaImage,
    background: [u8; 3],
    canvas_width: u32,
    canvas_height: u32,
) -> RgbaImage {
    let [r, g, b] = background;
    let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([r, g, b, 255]));

    let (x, y, width, height) =
        letterbox(frame.width(), frame.height(), canvas_width, canvas_height);
    let scaled = imageops::resize(frame, width, height, FilterType::Triangle);
    imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
    canvas
}
