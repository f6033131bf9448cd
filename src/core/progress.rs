//! 进度换算

/// 单次上传模拟阶段的最高进度，100 只在 finalize 之后给出
pub const SIMULATED_CEILING: u8 = 90;

/// `done / total` 的整数百分比
pub fn chunk_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = done.min(total);
    ((done as u128 * 100) / total as u128) as u8
}

/// 单次上传第 `tick` 步 (1..=ticks) 的模拟进度
pub fn tick_percent(tick: u32, ticks: u32) -> u8 {
    if ticks == 0 {
        return 0;
    }
    let tick = tick.min(ticks);
    ((tick as u64 * SIMULATED_CEILING as u64) / ticks as u64) as u8
}

/// Keeps progress non-decreasing within one attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressReporter {
    last: u8,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回应当发布的值；若回退则保持上一次的值
    pub fn advance(&mut self, percent: u8) -> u8 {
        self.last = self.last.max(percent.min(100));
        self.last
    }

    /// finalize 之后强制为 100
    pub fn complete(&mut self) -> u8 {
        self.last = 100;
        self.last
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}
