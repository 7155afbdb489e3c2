//! Wire frames for the output devices and ADC scaling.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use stim_core::preload::OutputRole;

/// DAC command bits: write and update, gain 1x, active.
pub const DAC_COMMAND: u16 = 0x3000;
pub const DAC_CODE_MASK: u16 = 0x0FFF;

/// Full-scale input with the internal 0.6 V reference and 1/6 gain.
pub const ADC_FULL_SCALE_MV: u32 = 3_600;
/// 10-bit conversions.
pub const ADC_COUNTS: u32 = 1_024;

/// Bytes per output transfer.
pub const FRAME_LEN: usize = 2;

/// SPI frame for `value`, MSB first.
#[must_use]
pub const fn frame(role: OutputRole, value: u16) -> [u8; FRAME_LEN] {
    let word = match role {
        OutputRole::ChannelSelect => value,
        OutputRole::Amplitude => DAC_COMMAND | (value & DAC_CODE_MASK),
    };
    word.to_be_bytes()
}

/// Converts a raw single-ended SAADC result to millivolts. Negative readings
/// from input offset clamp to zero.
#[must_use]
pub fn raw_to_millivolts(raw: i16) -> u16 {
    let counts = u32::try_from(raw).unwrap_or(0);
    let millivolts = counts * ADC_FULL_SCALE_MV / ADC_COUNTS;
    u16::try_from(millivolts).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_select_frames_are_the_raw_pattern() {
        assert_eq!(frame(OutputRole::ChannelSelect, 0x8001), [0x80, 0x01]);
        assert_eq!(frame(OutputRole::ChannelSelect, 0), [0x00, 0x00]);
    }

    #[test]
    fn amplitude_frames_carry_command_bits() {
        assert_eq!(frame(OutputRole::Amplitude, 0), [0x30, 0x00]);
        assert_eq!(frame(OutputRole::Amplitude, 4095), [0x3F, 0xFF]);
        assert_eq!(frame(OutputRole::Amplitude, 0xF123), [0x31, 0x23]);
    }

    #[test]
    fn adc_scaling_covers_full_range() {
        assert_eq!(raw_to_millivolts(0), 0);
        assert_eq!(raw_to_millivolts(512), 1_800);
        assert_eq!(raw_to_millivolts(1_023), 3_596);
        assert_eq!(raw_to_millivolts(-4), 0);
    }
}
