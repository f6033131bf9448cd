pub mod config;
pub mod core;
pub mod media;
pub mod transport;
pub mod utils;
pub mod validation;

// 重新导出核心类型
pub use core::{
    ChannelObserver,
    FileCategory,
    FileDescriptor,
    RemoteFile,
    Result,
    SourceFile,
    ThumbnailConfig,
    TransportAdapter,
    UploadConfig,
    UploadError,
    UploadEvent,
    UploadObserver,
    UploadOutcome,
    UploadSession,
    UploadStatus,
};

pub use media::{FrameSampler, ImageFrameSampler, MediaProcessor};
pub use transport::{HttpTransport, MemoryTransport};
pub use validation::{FileValidator, ValidationError, ValidationPolicy};
