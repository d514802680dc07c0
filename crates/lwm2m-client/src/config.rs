// crates/lwm2m-client/src/config.rs

//! Runtime-tunable protocol parameters. Defaults match the CoAP RFC 7252
//! §4.8 transmission parameters and the registration/bootstrap timing in
//! spec.md §4.

use crate::error::CoreError;

/// Tunable protocol parameters for one `Anj` instance.
///
/// Construct with [`Config::default`] and adjust fields directly, then call
/// [`Config::validate`] before handing it to `Anj::new` (which calls it for
/// you and rejects invalid values up front).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// CoAP `ACK_TIMEOUT` in milliseconds (RFC 7252 §4.8, default 2000).
    pub ack_timeout_ms: u64,
    /// CoAP `ACK_RANDOM_FACTOR`, must be `>= 1.0` (default 1.5).
    pub ack_random_factor: f32,
    /// CoAP `MAX_RETRANSMIT` (default 4).
    pub max_retransmit: u8,
    /// Host-level processing delay budget added to every deadline (§2).
    pub processing_delay_ms: u64,
    /// Idle deadline for a server-initiated exchange awaiting its next
    /// expected block (default 50_000 ms).
    pub server_request_timeout_ms: u64,
    /// Bootstrap-finish deadline in seconds (default 247, per §4.3).
    pub bootstrap_timeout_s: u32,
    /// Maximum number of BootstrapRequest attempts before giving up (§4.3/§6).
    pub bootstrap_retry_count: u32,
    /// Initial bootstrap retry back-off in seconds; doubles per attempt
    /// (`bootstrap_retry_timeout * 2^(attempt-1)`, §4.3/§6).
    pub bootstrap_retry_timeout_s: u32,
    /// Upper bound on simultaneously queued Send requests (§4.9).
    pub send_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ack_timeout_ms: 2_000,
            ack_random_factor: 1.5,
            max_retransmit: 4,
            processing_delay_ms: crate::types::PROCESSING_DELAY_MS,
            server_request_timeout_ms: crate::types::DEFAULT_SERVER_REQUEST_TIMEOUT_MS,
            bootstrap_timeout_s: crate::types::DEFAULT_BOOTSTRAP_TIMEOUT_S,
            // No hardcoded default survives in the original source for these
            // two (they're threaded through from an external config struct);
            // mirrored from the registration retry policy's own defaults.
            bootstrap_retry_count: 5,
            bootstrap_retry_timeout_s: 60,
            send_queue_capacity: 4,
        }
    }
}

impl Config {
    /// Rejects combinations that would violate the exchange engine's timing
    /// invariants (§4.1): a sub-1.0 random factor can make the computed
    /// timeout shrink below `ack_timeout_ms`, and a zero retry budget or
    /// zero-capacity queue are both degenerate.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.ack_random_factor < 1.0 {
            return Err(CoreError::InvalidUdpTxParams);
        }
        if self.ack_timeout_ms < 1_000 {
            return Err(CoreError::InvalidUdpTxParams);
        }
        if self.max_retransmit == 0 {
            return Err(CoreError::InvalidArgument("max_retransmit must be >= 1"));
        }
        if self.send_queue_capacity == 0 {
            return Err(CoreError::InvalidArgument("send_queue_capacity must be >= 1"));
        }
        if self.bootstrap_timeout_s == 0 {
            return Err(CoreError::InvalidArgument("bootstrap_timeout_s must be >= 1"));
        }
        if self.bootstrap_retry_count == 0 {
            return Err(CoreError::InvalidArgument("bootstrap_retry_count must be >= 1"));
        }
        if self.bootstrap_retry_timeout_s == 0 {
            return Err(CoreError::InvalidArgument("bootstrap_retry_timeout_s must be >= 1"));
        }
        Ok(())
    }

    /// Maximum span an exchange's retransmission series can occupy, per the
    /// RFC 7252 Appendix A worked example: `ACK_TIMEOUT * ((2^(MAX_RETRANSMIT+1) - 1)) * ACK_RANDOM_FACTOR`.
    pub fn max_transmit_span_ms(&self) -> u64 {
        let factor = (1u64 << (self.max_retransmit as u32 + 1)) - 1;
        let base = self.ack_timeout_ms.saturating_mul(factor);
        (base as f64 * self.ack_random_factor as f64) as u64
    }
}
