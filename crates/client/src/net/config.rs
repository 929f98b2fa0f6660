use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub handshake_timeout: Duration,
    pub handshake_poll_interval: Duration,
    /// Upper bound on how long the receive thread blocks before it
    /// re-checks the running flag.
    pub receive_timeout: Duration,
    pub send_interval_ticks: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(2),
            handshake_poll_interval: Duration::from_millis(10),
            receive_timeout: Duration::from_millis(100),
            send_interval_ticks: 5,
        }
    }
}
