pub mod progress;
pub mod retry;

pub use progress::{format_bytes, format_duration, format_speed};
pub use retry::{retry_with_config, RetryConfig, RetryStrategy};
