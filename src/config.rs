//! Build-time tuning, provided as a plain `const`-able record.
//!
//! Neither node reads configuration at runtime; a platform integrator picks
//! a `BridgeConfig` and builds it into the firmware image, the way the
//! teacher's board modules pick pins and clock dividers at compile time.

/// Fallback behavior when a string descriptor cannot be fetched from the
/// real device within the retry budget (§4.9, §9 Open Question (b)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFallbackPolicy {
    /// Forward a zero-length string descriptor to the PC.
    Empty,
    /// Forward a synthesized `"IDX<n>"`-style descriptor instead.
    Synthetic,
}

/// All tunables named across §5/§6/§8 of the design, gathered into one
/// record so a platform integrator builds exactly one of these per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// RX ring capacity backing the primary transport, in bytes.
    pub rx_ring_capacity: usize,
    /// Maximum class-specific descriptor payload per forwarded chunk.
    pub descriptor_chunk_size: usize,
    /// Pacing delay between descriptor chunks, in milliseconds.
    pub chunk_pace_ms: u32,
    /// Deadline for a READY handshake before DONE is resent, in milliseconds.
    pub ready_retry_ms: u32,
    /// Number of DONE resends before giving up and forcing a reset.
    pub ready_retry_limit: u8,
    /// Per string-request retry interval, in milliseconds.
    pub string_retry_ms: u32,
    /// Retries per string request before falling back.
    pub string_retry_limit: u8,
    /// Overall extra-fetch timeout for a string descriptor, in milliseconds.
    pub string_fetch_timeout_ms: u32,
    /// Synchronous GET_REPORT busy-wait ceiling on node D, in milliseconds.
    pub get_report_timeout_ms: u32,
    /// Whether device+config descriptors are re-sent just before DONE, as
    /// tolerance against UART loss on the first pass.
    pub resend_before_done: bool,
    /// String fallback policy (§9 Open Question (b)).
    pub string_fallback: StringFallbackPolicy,
    /// Budgeted RX drain on D during descriptor enumeration: {frames, µs}.
    pub drain_budget_enum: (u32, u32),
    /// Budgeted RX drain on D once steady-state: {frames, µs}.
    pub drain_budget_run: (u32, u32),
    /// Side-channel per-tick service budget: {bytes, µs}.
    pub sidechannel_budget: (u32, u32),
    /// Requested UART baud for the primary link; platform drivers that clamp
    /// to an achievable rate report the actual value back for diagnostics.
    pub baud: u32,
}

impl BridgeConfig {
    /// Defaults taken directly from the design's documented thresholds.
    pub const DEFAULT: BridgeConfig = BridgeConfig {
        rx_ring_capacity: 16 * 1024,
        descriptor_chunk_size: 48,
        chunk_pace_ms: 2,
        ready_retry_ms: 300,
        ready_retry_limit: 5,
        string_retry_ms: 180,
        string_retry_limit: 5,
        string_fetch_timeout_ms: 150,
        get_report_timeout_ms: 20,
        resend_before_done: true,
        string_fallback: StringFallbackPolicy::Empty,
        drain_budget_enum: (16, 500),
        drain_budget_run: (128, 5_000),
        sidechannel_budget: (512, 500),
        baud: 921_600,
    };
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
