use std::time::Duration;

/// Timing knobs shared by the parent controller and the child bootstrapper.
/// A `Runtime` carries one of these; tests shrink the intervals to keep
/// close-detection and debounce paths fast.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// How often the close watcher polls child window liveness.
    pub close_watch_interval: Duration,
    /// Delay between the two liveness probes of a `check_close`.
    pub check_close_delay: Duration,
    /// How long the prerender frame stays up after the child document
    /// takes over.
    pub prerender_release_delay: Duration,
    /// Debounce window for child auto-resize updates.
    pub resize_debounce: Duration,
    /// Upper bound on every call to a delegate host.
    pub delegate_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            close_watch_interval: Duration::from_millis(500),
            check_close_delay: Duration::from_millis(200),
            prerender_release_delay: Duration::from_millis(50),
            resize_debounce: Duration::from_millis(50),
            delegate_timeout: Duration::from_secs(5),
        }
    }
}
