//! Device clock to nanosecond conversion

use tracing::debug;

use crate::capture::device::{features, FeatureAccess};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Converts device ticks using the local device's timestamp frequency
pub struct TimestampNormalizer<'a> {
    local_device: &'a dyn FeatureAccess,
}

impl<'a> TimestampNormalizer<'a> {
    pub fn new(local_device: &'a dyn FeatureAccess) -> Self {
        Self { local_device }
    }

    /// Ticks to nanoseconds; raw ticks if the frequency is unavailable
    pub fn to_nanos(&self, ticks: u64) -> u64 {
        match self.local_device.get_integer(features::DEVICE_TIMESTAMP_FREQUENCY) {
            Ok(freq) if freq > 0 => {
                debug!("Using timestamp frequency {}", freq);
                ticks_to_nanos(ticks, freq as u64)
            }
            Ok(freq) => {
                debug!("Ignoring timestamp frequency {}", freq);
                ticks
            }
            Err(e) => {
                debug!("Timestamp frequency unavailable ({}), using raw ticks", e);
                ticks
            }
        }
    }
}

/// Integer conversion; lossy when `freq` does not divide 10^9 evenly.
pub fn ticks_to_nanos(ticks: u64, freq: u64) -> u64 {
    if freq > NANOS_PER_SEC {
        ticks / (freq / NANOS_PER_SEC)
    } else {
        ticks.saturating_mul(NANOS_PER_SEC / freq)
    }
}
