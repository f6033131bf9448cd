use tokio::sync::mpsc;
use super::errors::UploadError;
use super::traits::UploadObserver;
use super::types::{FileDescriptor, UploadStatus};

/// 上传事件
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 状态变更
    StateChanged {
        from: UploadStatus,
        to: UploadStatus,
    },
    /// 进度更新
    Progress {
        percent: u8,
        descriptor: FileDescriptor,
    },
    /// 上传完成
    Completed {
        descriptor: FileDescriptor,
    },
    /// 上传失败
    Failed {
        error: String,
        descriptor: FileDescriptor,
    },
}

/// Forwards observer callbacks onto an unbounded channel.
pub struct ChannelObserver {
    event_tx: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx }, event_rx)
    }

    fn emit(&self, event: UploadEvent) {
        // 接收端已关闭时直接丢弃
        let _ = self.event_tx.send(event);
    }
}

impl UploadObserver for ChannelObserver {
    fn on_progress(&self, percent: u8, descriptor: &FileDescriptor) {
        self.emit(UploadEvent::Progress {
            percent,
            descriptor: descriptor.clone(),
        });
    }

    fn on_complete(&self, descriptor: &FileDescriptor) {
        self.emit(UploadEvent::Completed {
            descriptor: descriptor.clone(),
        });
    }

    fn on_error(&self, error: &UploadError, descriptor: &FileDescriptor) {
        self.emit(UploadEvent::Failed {
            error: error.to_string(),
            descriptor: descriptor.clone(),
        });
    }

    fn on_state_change(&self, from: UploadStatus, to: UploadStatus) {
        self.emit(UploadEvent::StateChanged { from, to });
    }
}

// 静态断言确保类型是 Send 的
#[allow(dead_code)]
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadEvent>();
        assert_send::<ChannelObserver>();
    }
};
