//! Engine configuration.

use std::time::Duration;

/// Timing and budget knobs for the engine.
///
/// The defaults are the values the engine was tuned against; tests shrink
/// them where convenient.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to wait for the target entity to finish an
    /// externally-driven draw before applying anyway.
    pub draw_wait_timeout: Duration,
    /// Poll interval while waiting for the entity to settle.
    pub draw_poll_interval: Duration,
    /// How long to wait for a redraw acknowledgement before giving up on it.
    pub redraw_ack_timeout: Duration,
    /// Poll interval while waiting for the prior application attempt to
    /// finish (cancellation is checked between polls).
    pub handoff_poll_interval: Duration,
    /// Delay between download retry rounds.
    pub download_backoff: Duration,
    /// Maximum download retry rounds per attempt.
    pub download_attempts: u32,
    /// Minimum spacing between secondary-entity rebind calls.
    pub rebind_cooldown: Duration,
    /// Window after the visibility gate reopens during which visibility is
    /// reaffirmed at most once.
    pub grace_window: Duration,
    /// Proximity distance threshold for visibility.
    pub visibility_range: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            draw_wait_timeout: Duration::from_secs(30),
            draw_poll_interval: Duration::from_millis(250),
            redraw_ack_timeout: Duration::from_secs(5),
            handoff_poll_interval: Duration::from_millis(250),
            download_backoff: Duration::from_secs(2),
            download_attempts: 10,
            rebind_cooldown: Duration::from_millis(500),
            grace_window: Duration::from_secs(6),
            visibility_range: 100.0,
        }
    }
}
