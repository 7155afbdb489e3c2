//! Cycle timing arithmetic.
//!
//! All durations are integer microseconds. A cycle is `pulse_count` back-to-back
//! pulse slots followed by a pause that fills the remainder of the period.

/// One pulse-width unit, in microseconds.
pub const PULSE_WIDTH_UNIT_US: u32 = 100;

/// Fixed per-slot overhead added to every pulse.
pub const PULSE_OVERHEAD_US: u32 = 100;

/// Shortest pause a valid configuration leaves between cycles.
pub const MIN_PAUSE_US: u32 = 100;

/// Microseconds per second.
pub const MICROS_PER_SECOND: u32 = 1_000_000;

/// Duration of the on-phase of a pulse.
#[must_use]
pub const fn pulse_on_us(width_units: u32) -> u32 {
    width_units.saturating_mul(PULSE_WIDTH_UNIT_US)
}

/// Duration of a single pulse slot (`width * 100 + 100`).
#[must_use]
pub const fn single_pulse_us(width_units: u32) -> u32 {
    pulse_on_us(width_units).saturating_add(PULSE_OVERHEAD_US)
}

/// Total time spent emitting pulses within one cycle.
#[must_use]
pub const fn active_time_us(width_units: u32, pulse_count: u8) -> u32 {
    single_pulse_us(width_units).saturating_mul(pulse_count as u32)
}

/// Cycle period for the given repetition frequency. A zero frequency yields zero.
#[must_use]
pub const fn period_us(frequency_hz: u32) -> u32 {
    match frequency_hz {
        0 => 0,
        hz => MICROS_PER_SECOND / hz,
    }
}

/// Idle time between the last pulse of a cycle and the first pulse of the next.
#[must_use]
pub const fn pause_us(frequency_hz: u32, width_units: u32, pulse_count: u8) -> u32 {
    period_us(frequency_hz).saturating_sub(active_time_us(width_units, pulse_count))
}

/// Highest frequency whose period still fits the active time plus [`MIN_PAUSE_US`].
#[must_use]
pub const fn max_frequency(width_units: u32, pulse_count: u8) -> u32 {
    MICROS_PER_SECOND / active_time_us(width_units, pulse_count).saturating_add(MIN_PAUSE_US)
}

/// Converts microseconds to timer ticks for a fixed tick rate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TickClock {
    ticks_per_us: u32,
}

impl TickClock {
    /// 1 MHz timer: one tick per microsecond.
    pub const ONE_MHZ: Self = Self::new(1);

    /// Creates a converter; a zero rate is treated as one tick per microsecond.
    #[must_use]
    pub const fn new(ticks_per_us: u32) -> Self {
        Self {
            ticks_per_us: if ticks_per_us == 0 { 1 } else { ticks_per_us },
        }
    }

    #[must_use]
    pub const fn ticks_per_us(self) -> u32 {
        self.ticks_per_us
    }

    /// Saturating microsecond to tick conversion.
    #[must_use]
    pub const fn ticks(self, micros: u32) -> u32 {
        micros.saturating_mul(self.ticks_per_us)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::ONE_MHZ
    }
}
