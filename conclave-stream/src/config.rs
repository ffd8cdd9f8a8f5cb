//! Environment-driven streaming configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Buffering, backpressure, and liveness knobs for [`crate::StreamEngine`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// `STREAM_HEARTBEAT_S`, capped at 30s. Gap in activity after which a
    /// `status` keep-alive is due.
    pub heartbeat_interval: Duration,
    /// `STREAM_MAX_BUFFER_BYTES`. Bounded-channel byte budget per stream.
    pub max_buffer_size: usize,
    /// `STREAM_WINDOW_SIZE`. Outstanding-chunk count above which adaptive
    /// delay kicks in.
    pub window_size: usize,
    /// `STREAM_CHUNK_DELAY_MS`. Starting adaptive delay between chunks.
    pub chunk_delay: Duration,
    /// Max bytes per `text` chunk.
    pub chunk_byte_size: usize,
    /// Sessions idle longer than this are closed by the inactivity sweep.
    pub max_idle_minutes: u64,
    /// Ceiling the adaptive delay doubles up to.
    pub max_chunk_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(env_or("STREAM_HEARTBEAT_S", 30).min(30)),
            max_buffer_size: env_or("STREAM_MAX_BUFFER_BYTES", 1024 * 1024),
            window_size: env_or("STREAM_WINDOW_SIZE", 16),
            chunk_delay: Duration::from_millis(env_or("STREAM_CHUNK_DELAY_MS", 10)),
            chunk_byte_size: 512,
            max_idle_minutes: 30,
            max_chunk_delay: Duration::from_millis(500),
        }
    }
}

impl StreamConfig {
    /// Load configuration from the environment, falling back to documented
    /// defaults for any unset variable.
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_never_exceeds_thirty_seconds() {
        let cfg = StreamConfig::default();
        assert!(cfg.heartbeat_interval <= Duration::from_secs(30));
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = StreamConfig::default();
        assert!(cfg.max_buffer_size > 0);
        assert!(cfg.window_size > 0);
    }
}
