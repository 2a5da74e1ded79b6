//! Expansion policy: threshold evaluation and new-size calculation
//!
//! Pure computations with no side effects. The poller evaluates the
//! threshold against each fresh state snapshot; the size calculator turns
//! a volume's expansion policy into the capacity requested from the
//! provider.

use crate::models::VolumeConfig;

/// Result of evaluating used space against the resize threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCheck {
    /// Whether used space is above the threshold
    pub exceeded: bool,
    /// How far above the threshold, in GiB. Only meaningful when
    /// `exceeded` is true
    pub exceeded_by_gib: f64,
}

/// Evaluate used space against a percentage threshold of filesystem
/// capacity.
///
/// Callers must guard `filesystem_size_gib > 0`; the result is undefined
/// for an empty or unmeasured filesystem.
pub fn threshold_check(
    used_gib: f64,
    filesystem_size_gib: f64,
    threshold_percent: f64,
) -> ThresholdCheck {
    let threshold_gib = filesystem_size_gib * (threshold_percent / 100.0);

    ThresholdCheck {
        exceeded: used_gib > threshold_gib,
        exceeded_by_gib: used_gib - threshold_gib,
    }
}

/// Calculate the capacity to request from the provider.
///
/// An absolute increment wins whenever it is positive; otherwise the
/// percentage increment is applied with integer truncation. The result is
/// never below `current_gib`.
pub fn expanded_size(volume: &VolumeConfig, current_gib: u64) -> u64 {
    if volume.increment_gib > 0 {
        current_gib + volume.increment_gib
    } else {
        current_gib + current_gib * volume.increment_percent / 100
    }
}
