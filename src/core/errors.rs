use thiserror::Error;
use crate::media::MediaError;
use crate::validation::ValidationError;
use super::types::UploadStatus;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Media processing error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: status code {status}, message: {message}")]
    Server {
        status: u16,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Chunk {chunk_index} not acknowledged by the server")]
    NotReceived {
        chunk_index: u64,
    },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    #[error("Finalize failed: {0}")]
    Finalize(#[source] Box<UploadError>),

    #[error("Upload was cancelled")]
    Aborted,

    #[error("Cannot {action} while {from}")]
    InvalidTransition {
        from: UploadStatus,
        action: &'static str,
    },

    #[error("No file selected")]
    NoFile,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl UploadError {
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// 是否为取消导致的错误（取消不是失败）
    pub fn is_aborted(&self) -> bool {
        matches!(self, UploadError::Aborted)
    }

    /// 单次传输失败是否值得重试
    ///
    /// 服务端只有 5xx、408 和 429 会重试；其余 4xx 重发同一请求不会有不同结果。
    /// 取消和调用方错误不会重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Server { status, .. } => is_retryable_status(*status),
            UploadError::Http(err) => err
                .status()
                .is_none_or(|status| is_retryable_status(status.as_u16())),
            UploadError::Aborted
            | UploadError::Validation(_)
            | UploadError::InvalidTransition { .. }
            | UploadError::NoFile
            | UploadError::InvalidConfig(_)
            | UploadError::Url(_) => false,
            _ => true,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
