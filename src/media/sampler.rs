use std::io::Cursor;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use crate::core::{PreviewImage, SourceFile};
use super::MediaError;

/// 视频探测信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub codec: Option<String>,
    pub bitrate: Option<u64>,
    pub frame_rate: Option<f64>,
}

/// 打开的视频解码句柄，drop 时释放底层资源
#[async_trait]
pub trait VideoSource: Send {
    /// 只读取足够的数据来获得元信息
    async fn probe(&mut self) -> Result<VideoProbe, MediaError>;

    /// 定位到 `position` 并取出当前帧
    async fn sample_frame(&mut self, position: Duration) -> Result<RgbaImage, MediaError>;
}

/// Platform capability for turning media bytes into frames and frames into
/// preview rasters.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    async fn decode_image(&self, data: Bytes) -> Result<RgbaImage, MediaError>;

    async fn open_video(&self, source: &SourceFile) -> Result<Box<dyn VideoSource>, MediaError>;

    /// 以 `quality` (0, 1] 编码为有损预览图
    async fn encode_raster(
        &self,
        frame: RgbaImage,
        quality: f32,
    ) -> Result<PreviewImage, MediaError>;
}

/// 基于 `image` crate 的实现：支持静态图片，不支持视频解码
#[derive(Debug, Clone, Default)]
pub struct ImageFrameSampler;

impl ImageFrameSampler {
    pub fn new() -> Self {
        Self
    }

    pub fn encode_jpeg(frame: &RgbaImage, quality: f32) -> Result<PreviewImage, MediaError> {
        let quality = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
        let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();

        let mut buffer = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buffer, quality)
            .encode_image(&rgb)
            .map_err(|err| MediaError::Encode(err.to_string()))?;

        Ok(PreviewImage {
            data: Bytes::from(buffer.into_inner()),
            mime_type: "image/jpeg".to_string(),
            width: frame.width(),
            height: frame.height(),
        })
    }
}

#[async_trait]
impl FrameSampler for ImageFrameSampler {
    async fn decode_image(&self, data: Bytes) -> Result<RgbaImage, MediaError> {
        tokio::task::spawn_blocking(move || {
            image::load_from_memory(&data)
                .map(|img| img.to_rgba8())
                .map_err(|err| MediaError::Decode(err.to_string()))
        })
        .await
        .map_err(|err| MediaError::Decode(format!("decode task panicked: {err}")))?
    }

    async fn open_video(&self, source: &SourceFile) -> Result<Box<dyn VideoSource>, MediaError> {
        Err(MediaError::Unsupported(format!(
            "no video decoder available for {}",
            source.name()
        )))
    }

    async fn encode_raster(
        &self,
        frame: RgbaImage,
        quality: f32,
    ) -> Result<PreviewImage, MediaError> {
        tokio::task::spawn_blocking(move || Self::encode_jpeg(&frame, quality))
            .await
            .map_err(|err| MediaError::Encode(format!("encode task panicked: {err}")))?
    }
}
