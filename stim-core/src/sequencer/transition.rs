//! Pure PULSE/PAUSE transition logic.

use core::fmt;

use crate::config::CycleSnapshot;
use crate::preload::OutputPair;

/// The two states of the sequencing clock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Pulse,
    Pause,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pulse => f.write_str("PULSE"),
            Phase::Pause => f.write_str("PAUSE"),
        }
    }
}

/// Where the sequencer is within a cycle. `pulse_index` is zero while pausing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Position {
    pub phase: Phase,
    pub pulse_index: u8,
}

impl Position {
    pub const FIRST_PULSE: Self = Self {
        phase: Phase::Pulse,
        pulse_index: 0,
    };

    pub const PAUSE: Self = Self {
        phase: Phase::Pause,
        pulse_index: 0,
    };
}

/// What happens to the pulse timer when entering the next state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PulseTimerAction {
    /// Next pulse of the same burst: clear the counter to replay the waveform.
    Restart,
    /// First pulse after a pause.
    Enable,
    /// Burst finished.
    Disable,
}

/// Everything needed to re-arm the hardware for the next state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RearmParams {
    pub interval_us: u32,
    pub pulse_timer: PulseTimerAction,
    /// Outputs for the state after `next`, staged while `next` runs.
    pub upcoming: OutputPair,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Transition {
    pub next: Position,
    pub rearm: RearmParams,
}

/// Computes the state that follows `current` and how to arm it.
#[must_use]
pub fn next_transition(current: Position, config: &CycleSnapshot) -> Transition {
    let (next, pulse_timer) = match current.phase {
        Phase::Pulse => {
            let pulse_index = current.pulse_index.saturating_add(1);
            if pulse_index < config.pulse_count {
                (
                    Position {
                        phase: Phase::Pulse,
                        pulse_index,
                    },
                    PulseTimerAction::Restart,
                )
            } else {
                (Position::PAUSE, PulseTimerAction::Disable)
            }
        }
        Phase::Pause => (Position::FIRST_PULSE, PulseTimerAction::Enable),
    };

    Transition {
        next,
        rearm: RearmParams {
            interval_us: state_interval_us(next.phase, config),
            pulse_timer,
            upcoming: upcoming_outputs(next, config),
        },
    }
}

/// Length of a state: one pulse slot, or the remainder of the period.
#[must_use]
pub const fn state_interval_us(phase: Phase, config: &CycleSnapshot) -> u32 {
    match phase {
        Phase::Pulse => config.single_pulse_us(),
        Phase::Pause => config.pause_us(),
    }
}

/// Outputs belonging to the state that follows `position`.
#[must_use]
pub fn upcoming_outputs(position: Position, config: &CycleSnapshot) -> OutputPair {
    match position.phase {
        Phase::Pulse => {
            let next = position.pulse_index.saturating_add(1);
            if next < config.pulse_count {
                config.output_for(next)
            } else {
                OutputPair::SILENT
            }
        }
        Phase::Pause => config.output_for(0),
    }
}
