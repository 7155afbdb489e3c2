//! Boot-time configuration values and hardware limits.

/// Maximum number of pulses in one cycle.
pub const MAX_PULSES: usize = 16;

pub const MIN_FREQUENCY_HZ: u32 = 1;
pub const MAX_FREQUENCY_HZ: u32 = 100;
pub const DEFAULT_FREQUENCY_HZ: u32 = 1;

pub const MIN_PULSE_WIDTH_UNITS: u32 = 1;
pub const MAX_PULSE_WIDTH_UNITS: u32 = 10;
pub const DEFAULT_PULSE_WIDTH_UNITS: u32 = 5;

pub const DEFAULT_PULSE_COUNT: u8 = 8;

/// Highest code accepted by the 12-bit amplitude DAC.
pub const MAX_AMPLITUDE_CODE: u16 = 4095;

/// Lead time between staging the next outputs and the state transition.
pub const ADVANCE_TIME_US: u32 = 50;

/// Channel-select pattern driven while pausing or stopped (all channels open).
pub const PAUSE_PATTERN: u16 = 0x0000;

/// Amplitude driven while pausing or stopped.
pub const PAUSE_AMPLITUDE: u16 = 0;

pub const DEFAULT_CHANNEL_PATTERNS: [u16; MAX_PULSES] = [
    0x0101, 0x0202, 0x0404, 0x0808, 0x1010, 0x2020, 0x4040, 0x8080, //
    0x0101, 0x0202, 0x0404, 0x0808, 0x1010, 0x2020, 0x4040, 0x8080,
];

pub const DEFAULT_AMPLITUDE_VALUES: [u16; MAX_PULSES] = amplitude_ramp();

const AMPLITUDE_RAMP_START: u16 = 200;
const AMPLITUDE_RAMP_STEP: u16 = 250;
/// The last pulse is driven at the top of the ramp rather than one step short.
const AMPLITUDE_RAMP_PEAK: u16 = 4_000;

#[allow(clippy::cast_possible_truncation)]
const fn amplitude_ramp() -> [u16; MAX_PULSES] {
    let mut values = [0; MAX_PULSES];
    let mut index = 0;
    while index < MAX_PULSES {
        values[index] = AMPLITUDE_RAMP_START + AMPLITUDE_RAMP_STEP * index as u16;
        index += 1;
    }
    values[MAX_PULSES - 1] = AMPLITUDE_RAMP_PEAK;
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::max_frequency;

    #[test]
    fn amplitude_ramp_fits_dac_range() {
        assert_eq!(DEFAULT_AMPLITUDE_VALUES[0], 200);
        assert_eq!(DEFAULT_AMPLITUDE_VALUES[1], 450);
        assert_eq!(DEFAULT_AMPLITUDE_VALUES[14], 3_700);
        assert_eq!(DEFAULT_AMPLITUDE_VALUES[15], 4_000);
        assert!(DEFAULT_AMPLITUDE_VALUES.iter().all(|&v| v <= MAX_AMPLITUDE_CODE));
    }

    #[test]
    fn defaults_satisfy_frequency_bound() {
        assert!(
            DEFAULT_FREQUENCY_HZ <= max_frequency(DEFAULT_PULSE_WIDTH_UNITS, DEFAULT_PULSE_COUNT)
        );
        assert!(
            DEFAULT_CHANNEL_PATTERNS[..usize::from(DEFAULT_PULSE_COUNT)]
                .iter()
                .all(|&p| p != 0)
        );
    }
}
