//! # brutal-transport: Kernel Contract
//!
//! Constants and payload shared with the tcp-brutal kernel module. These are
//! fixed by the module's ABI and must not be derived or tuned at runtime.

/// Name the kernel module registers its congestion control under.
pub const BRUTAL_CONGESTION_CONTROL: &str = "brutal";

/// `TCP_BRUTAL_PARAMS`: private `IPPROTO_TCP` option number of the module.
pub const TCP_BRUTAL_PARAMS: libc::c_int = 23301;

/// Congestion window gain in tenths (15 = 1.5x).
pub const CWND_GAIN_TENTHS: u32 = 15;

/// Payload of `TCP_BRUTAL_PARAMS`.
///
/// ## Layout
/// Packed, native endian: bytes 0..8 `rate`, bytes 8..12 `cwnd_gain`. The
/// kernel reads it as raw bytes, so there must be no padding.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionParams {
    /// Send rate in bytes per second.
    pub rate: u64,
    pub cwnd_gain: u32,
}

static_assertions::assert_eq_size!(CongestionParams, [u8; 12]);

impl CongestionParams {
    pub fn new(rate: u64) -> Self {
        Self {
            rate,
            cwnd_gain: CWND_GAIN_TENTHS,
        }
    }

    /// The exact bytes handed to `setsockopt`.
    pub fn to_bytes(&self) -> [u8; 12] {
        let rate = self.rate;
        let cwnd_gain = self.cwnd_gain;
        let mut out = [0u8; 12];
        out[..8].copy_from_slice(&rate.to_ne_bytes());
        out[8..].copy_from_slice(&cwnd_gain.to_ne_bytes());
        out
    }
}
