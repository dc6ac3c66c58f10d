use std::time::Duration;

/// Tunables for the supervisor and the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Country code substituted for a leading local-trunk zero when
    /// normalizing raw phone numbers.
    pub default_country_code: String,
    /// Fixed delay before reconnecting after a non-logout close.
    pub reconnect_delay: Duration,
    /// Interval between authenticated keep-alive probes.
    pub keepalive_interval: Duration,
    /// Deliberate delay before sending the auto read receipt, to keep the
    /// send rate low.
    pub read_receipt_delay: Duration,
    /// Group participant numbers stored per chat row; the stored column has
    /// bounded width, so rosters are truncated to this prefix.
    pub max_stored_participants: usize,
    /// Progress-log granularity while draining a history batch.
    pub history_log_every: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_country_code: "20".to_string(),
            reconnect_delay: Duration::from_secs(3),
            keepalive_interval: Duration::from_secs(30),
            read_receipt_delay: Duration::from_secs(1),
            max_stored_participants: 3,
            history_log_every: 50,
        }
    }
}
