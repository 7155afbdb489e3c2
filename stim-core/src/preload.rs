//! Contract for the two preloaded output devices (channel-select MUX and amplitude DAC).
//!
//! A preload channel owns a small transfer buffer. `prepare` fills it and arms
//! the transfer without starting the clock; the start task is then fired by the
//! routing fabric at the preload instant, so the value lands with no software
//! latency. `write_immediate` is the slow path used when starting or stopping.

use core::fmt;

/// Which of the two preloaded outputs a value is destined for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputRole {
    ChannelSelect,
    Amplitude,
}

impl fmt::Display for OutputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputRole::ChannelSelect => f.write_str("channel-select"),
            OutputRole::Amplitude => f.write_str("amplitude"),
        }
    }
}

/// Channel routing and amplitude belonging to one state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OutputPair {
    pub pattern: u16,
    pub amplitude: u16,
}

impl OutputPair {
    /// All channels open, zero amplitude. Used for pauses and when stopped.
    pub const SILENT: Self = Self::new(
        crate::config::defaults::PAUSE_PATTERN,
        crate::config::defaults::PAUSE_AMPLITUDE,
    );

    #[must_use]
    pub const fn new(pattern: u16, amplitude: u16) -> Self {
        Self { pattern, amplitude }
    }
}

/// Failures reported by a preload channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PreloadError {
    /// A previous held or running transfer has not completed.
    Busy,
    /// The peripheral rejected the transfer setup.
    Fault,
}

impl fmt::Display for PreloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreloadError::Busy => f.write_str("transfer still pending"),
            PreloadError::Fault => f.write_str("transfer setup failed"),
        }
    }
}

/// Output device whose next value can be staged ahead of a hardware trigger.
///
/// `prepare` and `abort` must never block: both are called from the timing ISR.
pub trait OutputPreloadChannel {
    /// Stages `value` and arms a transfer that waits for the start task.
    fn prepare(&mut self, value: u16) -> Result<(), PreloadError>;

    /// Aborts anything outstanding and starts a transfer of `value` now.
    fn write_immediate(&mut self, value: u16) -> Result<(), PreloadError>;

    /// Address of the start task the routing fabric triggers.
    fn start_task_address(&self) -> u32;

    /// Cancels any held or in-flight transfer.
    fn abort(&mut self);

    /// True when no transfer is outstanding.
    fn is_ready(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pair_is_silent() {
        assert_eq!(OutputPair::SILENT, OutputPair::default());
        assert_eq!(OutputPair::SILENT, OutputPair::new(0, 0));
    }
}
