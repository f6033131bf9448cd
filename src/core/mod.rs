mod cancel;
mod errors;
mod events;
mod progress;
mod scheduler;
mod session;
mod source;
mod traits;
mod types;

#[cfg(test)]
mod tests;

pub use cancel::AttemptToken;
pub use errors::{Result, UploadError};
pub use events::{ChannelObserver, UploadEvent};
pub use progress::{chunk_percent, tick_percent, ProgressReporter, SIMULATED_CEILING};
pub use scheduler::{ChunkAck, ChunkJob, ChunkScheduler};
pub use session::{UploadSession, UploadSessionBuilder};
pub use source::SourceFile;
pub use traits::{
    ChunkRequest,
    ChunkResponse,
    FinalizeRequest,
    InitiateRequest,
    InitiateResponse,
    NoopObserver,
    TransportAdapter,
    UploadObserver,
};
pub use types::{
    total_chunks,
    ChunkPlan,
    FileCategory,
    FileDescriptor,
    MediaMetadata,
    PreviewImage,
    RemoteFile,
    RetryBackoff,
    ThumbnailConfig,
    UploadConfig,
    UploadOutcome,
    UploadStatus,
};
