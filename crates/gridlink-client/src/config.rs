use std::time::Duration;

/// Client configuration.
///
/// All knobs have conservative defaults; construct with `Default` and
/// override what you need:
///
/// ```
/// use std::time::Duration;
/// use gridlink_client::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_procedure_call_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long an individual procedure call may stay unanswered before the
    /// client completes it with a connection-timeout response.
    pub procedure_call_timeout: Duration,
    /// How long a connection may go without any inbound traffic (heartbeat
    /// answers included) before it is closed as dead. Heartbeats are sent
    /// once a third of this has elapsed idle.
    pub connection_response_timeout: Duration,
    /// Write-queue high-water mark per connection; beyond it the connection
    /// reports backpressure.
    pub backpressure_queue_bytes: usize,
    /// Run the reactor with `cores / 2` I/O workers instead of one.
    pub use_multiple_threads: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            procedure_call_timeout: Duration::from_secs(2 * 60),
            connection_response_timeout: Duration::from_secs(2 * 60),
            backpressure_queue_bytes: 262_144,
            use_multiple_threads: false,
        }
    }
}

impl ClientConfig {
    pub fn with_procedure_call_timeout(mut self, timeout: Duration) -> Self {
        self.procedure_call_timeout = timeout;
        self
    }

    pub fn with_connection_response_timeout(mut self, timeout: Duration) -> Self {
        self.connection_response_timeout = timeout;
        self
    }

    pub fn with_backpressure_queue_bytes(mut self, bytes: usize) -> Self {
        self.backpressure_queue_bytes = bytes;
        self
    }

    pub fn with_multiple_threads(mut self, on: bool) -> Self {
        self.use_multiple_threads = on;
        self
    }

    pub(crate) fn reactor_worker_threads(&self) -> usize {
        if self.use_multiple_threads {
            std::thread::available_parallelism()
                .map(|n| (n.get() / 2).max(1))
                .unwrap_or(1)
        } else {
            1
        }
    }
}
