//! Live cycle configuration shared between the command context and the timing ISR.
//!
//! Scalars are atomics so the command layer can read them without masking
//! interrupts. The pattern and amplitude tables, together with `pulse_count`,
//! live behind a `critical_section::Mutex` so a reader never sees a table that
//! is half written or a count that disagrees with its table. Every successful
//! mutation raises the update flag; the sequencer consumes it at the next state
//! transition and only then switches to the new values.

pub mod defaults;

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::preload::OutputPair;
use crate::timing;

use defaults::{
    DEFAULT_AMPLITUDE_VALUES, DEFAULT_CHANNEL_PATTERNS, DEFAULT_FREQUENCY_HZ,
    DEFAULT_PULSE_COUNT, DEFAULT_PULSE_WIDTH_UNITS, MAX_AMPLITUDE_CODE, MAX_FREQUENCY_HZ,
    MAX_PULSE_WIDTH_UNITS, MAX_PULSES, MIN_FREQUENCY_HZ, MIN_PULSE_WIDTH_UNITS,
};

/// Validation failures reported to the command layer. The configuration is
/// left untouched whenever one of these is returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Frequency outside `1..=max`, where `max` accounts for the current pulse train.
    FrequencyOutOfRange { requested: u32, max: u32 },
    PulseWidthOutOfRange(u32),
    /// Table updates need at least one entry.
    EmptyTable,
    /// More entries than pulse slots.
    TooManyEntries(usize),
    /// A pattern table must route at least one pulse.
    AllZeroPatterns,
    AmplitudeOutOfRange { index: usize, value: u16 },
}

/// Error returned by [`CycleConfig::set_frequency`].
pub type RangeError = ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FrequencyOutOfRange { requested, max } => {
                write!(f, "frequency {requested} Hz outside 1..={max} Hz")
            }
            ConfigError::PulseWidthOutOfRange(width) => write!(
                f,
                "pulse width {width} outside {MIN_PULSE_WIDTH_UNITS}..={MAX_PULSE_WIDTH_UNITS}"
            ),
            ConfigError::EmptyTable => f.write_str("table update needs at least one value"),
            ConfigError::TooManyEntries(len) => {
                write!(f, "{len} values exceed the {MAX_PULSES} pulse slots")
            }
            ConfigError::AllZeroPatterns => f.write_str("channel patterns are all zero"),
            ConfigError::AmplitudeOutOfRange { index, value } => write!(
                f,
                "amplitude {value} at slot {index} exceeds {MAX_AMPLITUDE_CODE}"
            ),
        }
    }
}

/// Side effect of an accepted update on the frequency setting.
#[must_use]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Adjustment {
    Unchanged,
    /// The new pulse train no longer fit the period, so frequency was lowered.
    FrequencyClamped { from: u32, to: u32 },
}

/// Per-pulse channel routing and amplitude codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct PulseTables {
    channel_patterns: [u16; MAX_PULSES],
    amplitude_values: [u16; MAX_PULSES],
    pulse_count: u8,
}

impl PulseTables {
    const DEFAULT: Self = Self {
        channel_patterns: DEFAULT_CHANNEL_PATTERNS,
        amplitude_values: DEFAULT_AMPLITUDE_VALUES,
        pulse_count: DEFAULT_PULSE_COUNT,
    };
}

/// Point-in-time copy of the whole configuration, taken under one critical section.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CycleSnapshot {
    pub frequency_hz: u32,
    pub pulse_width_units: u32,
    pub pulse_count: u8,
    pub channel_patterns: [u16; MAX_PULSES],
    pub amplitude_values: [u16; MAX_PULSES],
}

impl CycleSnapshot {
    /// Snapshot of the boot defaults.
    pub const DEFAULT: Self = Self {
        frequency_hz: DEFAULT_FREQUENCY_HZ,
        pulse_width_units: DEFAULT_PULSE_WIDTH_UNITS,
        pulse_count: DEFAULT_PULSE_COUNT,
        channel_patterns: DEFAULT_CHANNEL_PATTERNS,
        amplitude_values: DEFAULT_AMPLITUDE_VALUES,
    };

    #[must_use]
    pub const fn single_pulse_us(&self) -> u32 {
        timing::single_pulse_us(self.pulse_width_units)
    }

    #[must_use]
    pub const fn active_time_us(&self) -> u32 {
        timing::active_time_us(self.pulse_width_units, self.pulse_count)
    }

    #[must_use]
    pub const fn pause_us(&self) -> u32 {
        timing::pause_us(self.frequency_hz, self.pulse_width_units, self.pulse_count)
    }

    /// Channel pattern and amplitude for a pulse slot. Slots past the table
    /// end resolve to the silent pair.
    #[must_use]
    pub fn output_for(&self, index: u8) -> OutputPair {
        let slot = usize::from(index);
        match (
            self.channel_patterns.get(slot),
            self.amplitude_values.get(slot),
        ) {
            (Some(&pattern), Some(&amplitude)) => OutputPair::new(pattern, amplitude),
            _ => OutputPair::SILENT,
        }
    }
}

impl Default for CycleSnapshot {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Shared configuration store. Intended to live in a `static`.
pub struct CycleConfig {
    frequency_hz: AtomicU32,
    pulse_width_units: AtomicU32,
    pulse_count: AtomicU8,
    tables: Mutex<RefCell<PulseTables>>,
    update_pending: AtomicBool,
}

impl CycleConfig {
    /// Creates a store holding the boot defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frequency_hz: AtomicU32::new(DEFAULT_FREQUENCY_HZ),
            pulse_width_units: AtomicU32::new(DEFAULT_PULSE_WIDTH_UNITS),
            pulse_count: AtomicU8::new(DEFAULT_PULSE_COUNT),
            tables: Mutex::new(RefCell::new(PulseTables::DEFAULT)),
            update_pending: AtomicBool::new(false),
        }
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz.load(Ordering::Acquire)
    }

    pub fn pulse_width_units(&self) -> u32 {
        self.pulse_width_units.load(Ordering::Acquire)
    }

    pub fn pulse_count(&self) -> u8 {
        self.pulse_count.load(Ordering::Acquire)
    }

    /// Highest frequency the current pulse train allows.
    pub fn max_frequency(&self) -> u32 {
        timing::max_frequency(self.pulse_width_units(), self.pulse_count()).min(MAX_FREQUENCY_HZ)
    }

    /// Sets the cycle frequency. Rejected, leaving everything unchanged, when
    /// the period could not hold the pulse train plus the minimum pause.
    pub fn set_frequency(&self, frequency_hz: u32) -> Result<(), RangeError> {
        critical_section::with(|_| {
            let max = self.max_frequency();
            if !(MIN_FREQUENCY_HZ..=max).contains(&frequency_hz) {
                return Err(ConfigError::FrequencyOutOfRange {
                    requested: frequency_hz,
                    max,
                });
            }

            self.frequency_hz.store(frequency_hz, Ordering::Release);
            self.mark_updated();
            Ok(())
        })
    }

    /// Sets the pulse width, lowering the frequency if the wider pulses no
    /// longer fit the current period.
    pub fn set_pulse_width(&self, width_units: u32) -> Result<Adjustment, ConfigError> {
        if !(MIN_PULSE_WIDTH_UNITS..=MAX_PULSE_WIDTH_UNITS).contains(&width_units) {
            return Err(ConfigError::PulseWidthOutOfRange(width_units));
        }

        Ok(critical_section::with(|_| {
            self.pulse_width_units.store(width_units, Ordering::Release);
            let adjustment = self.clamp_frequency();
            self.mark_updated();
            adjustment
        }))
    }

    /// Replaces the channel pattern table. Unlisted slots are cleared and the
    /// pulse count becomes the position of the last non-zero pattern plus one.
    pub fn set_channel_patterns(&self, patterns: &[u16]) -> Result<Adjustment, ConfigError> {
        validate_table_len(patterns.len())?;
        let last = patterns
            .iter()
            .rposition(|&pattern| pattern != 0)
            .ok_or(ConfigError::AllZeroPatterns)?;
        let count = u8::try_from(last + 1).map_err(|_| ConfigError::TooManyEntries(last + 1))?;

        Ok(critical_section::with(|cs| {
            {
                let mut tables = self.tables.borrow_ref_mut(cs);
                tables.channel_patterns = [0; MAX_PULSES];
                tables.channel_patterns[..patterns.len()].copy_from_slice(patterns);
                tables.pulse_count = count;
            }
            self.pulse_count.store(count, Ordering::Release);
            let adjustment = self.clamp_frequency();
            self.mark_updated();
            adjustment
        }))
    }

    /// Replaces the amplitude table. Unlisted slots are cleared; the pulse
    /// count is unaffected.
    pub fn set_amplitude_values(&self, amplitudes: &[u16]) -> Result<(), ConfigError> {
        validate_table_len(amplitudes.len())?;
        if let Some((index, &value)) = amplitudes
            .iter()
            .enumerate()
            .find(|&(_, &value)| value > MAX_AMPLITUDE_CODE)
        {
            return Err(ConfigError::AmplitudeOutOfRange { index, value });
        }

        critical_section::with(|cs| {
            let mut tables = self.tables.borrow_ref_mut(cs);
            tables.amplitude_values = [0; MAX_PULSES];
            tables.amplitude_values[..amplitudes.len()].copy_from_slice(amplitudes);
        });
        self.mark_updated();
        Ok(())
    }

    /// Copies every field under a single critical section.
    pub fn snapshot(&self) -> CycleSnapshot {
        critical_section::with(|cs| {
            let tables = self.tables.borrow_ref(cs);
            CycleSnapshot {
                frequency_hz: self.frequency_hz.load(Ordering::Acquire),
                pulse_width_units: self.pulse_width_units.load(Ordering::Acquire),
                pulse_count: tables.pulse_count,
                channel_patterns: tables.channel_patterns,
                amplitude_values: tables.amplitude_values,
            }
        })
    }

    /// Returns whether an update was pending and clears it. Called by the
    /// timing ISR once per state transition.
    pub fn test_and_clear_update_flag(&self) -> bool {
        self.update_pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_update_pending(&self) -> bool {
        self.update_pending.load(Ordering::Acquire)
    }

    fn mark_updated(&self) {
        self.update_pending.store(true, Ordering::Release);
    }

    // Caller holds the critical section.
    fn clamp_frequency(&self) -> Adjustment {
        let max = self.max_frequency();
        let current = self.frequency_hz.load(Ordering::Acquire);
        if current > max {
            self.frequency_hz.store(max, Ordering::Release);
            Adjustment::FrequencyClamped {
                from: current,
                to: max,
            }
        } else {
            Adjustment::Unchanged
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_table_len(len: usize) -> Result<(), ConfigError> {
    match len {
        0 => Err(ConfigError::EmptyTable),
        len if len > MAX_PULSES => Err(ConfigError::TooManyEntries(len)),
        _ => Ok(()),
    }
}
