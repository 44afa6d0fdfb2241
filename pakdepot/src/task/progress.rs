//! Monotonic progress tracking.

/// Holder of a 0-100 progress value that only moves forward.
///
/// `advance` suppresses duplicate and regressive reports; the value resets
/// to zero only when a new phase that tracks its own progress begins.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    value: u8,
}

impl ProgressTracker {
    /// Create a tracker at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value in [0, 100].
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Advance to `value` (clamped to 100).
    ///
    /// Returns the new value when it increased over the last held value,
    /// `None` otherwise.
    pub fn advance(&mut self, value: u8) -> Option<u8> {
        let value = value.min(100);
        if value > self.value {
            self.value = value;
            Some(value)
        } else {
            None
        }
    }

    /// Reset to zero on entry to a new phase.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}
