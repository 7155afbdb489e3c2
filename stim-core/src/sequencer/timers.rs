//! Hardware timer contracts and the compare values loaded into them.

use crate::config::defaults::ADVANCE_TIME_US;
use crate::timing::{TickClock, pulse_on_us};

/// Shortest interval ever loaded into the state timer. A compare at zero
/// would not fire until the counter wrapped.
pub const MIN_STATE_TICKS: u32 = 2;

/// Spacing between the pulse timer's compare edges.
pub const EDGE_GUARD_TICKS: u32 = 10;

/// Tick rate and preload lead used when arming the timers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimingProfile {
    pub clock: TickClock,
    pub advance_time_us: u32,
}

impl TimingProfile {
    pub const DEFAULT: Self = Self {
        clock: TickClock::ONE_MHZ,
        advance_time_us: ADVANCE_TIME_US,
    };
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Compare values for one state: the transition instant and the preload
/// instant that precedes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StateArm {
    pub transition_ticks: u32,
    pub preload_ticks: u32,
}

impl StateArm {
    /// Places the preload `advance_time_us` before the transition, or halfway
    /// when the state is not longer than the lead.
    #[must_use]
    pub const fn new(interval_us: u32, profile: TimingProfile) -> Self {
        let mut transition_ticks = profile.clock.ticks(interval_us);
        if transition_ticks < MIN_STATE_TICKS {
            transition_ticks = MIN_STATE_TICKS;
        }
        let advance_ticks = profile.clock.ticks(profile.advance_time_us);
        let preload_ticks = if transition_ticks > advance_ticks {
            transition_ticks - advance_ticks
        } else {
            transition_ticks / 2
        };

        Self {
            transition_ticks,
            preload_ticks,
        }
    }
}

/// Compare layout of the pulse timer for one pulse width.
///
/// `start`/`end` drive the stimulation output and `mirror_start`/`mirror_end`
/// the optional status mirror, which copies the output edges. `wrap` clears
/// and halts the counter through shorts. Every edge falls inside the pulse
/// slot, so nothing fires after the transition that ends the pulse.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PulseWaveform {
    pub start: u32,
    pub end: u32,
    pub mirror_start: u32,
    pub mirror_end: u32,
    pub wrap: u32,
}

impl PulseWaveform {
    #[must_use]
    pub const fn for_width(width_units: u32, clock: TickClock) -> Self {
        let on = clock.ticks(pulse_on_us(width_units));
        Self {
            start: EDGE_GUARD_TICKS,
            end: on + EDGE_GUARD_TICKS,
            mirror_start: EDGE_GUARD_TICKS,
            mirror_end: on + EDGE_GUARD_TICKS,
            wrap: on + 2 * EDGE_GUARD_TICKS,
        }
    }
}

/// Sequencing clock with a transition and a preload compare channel.
pub trait StateTimer {
    /// Loads both compare channels for the state beginning now. A stopped
    /// timer is cleared and started; a running one is expected to have
    /// restarted its count at the transition compare that led here.
    fn arm(&mut self, arm: StateArm);

    /// Stops the timer; no further compare events fire.
    fn disable(&mut self);
}

/// One-shot waveform timer whose edges are routed to GPIO tasks.
pub trait PulseTimer {
    /// Stops and clears the timer, then loads the compare layout. The timer
    /// stays stopped until [`PulseTimer::enable`].
    fn configure(&mut self, waveform: PulseWaveform);

    fn enable(&mut self);

    fn disable(&mut self);

    /// Clears the counter and lets it run so the next pulse starts from the
    /// first edge.
    fn restart(&mut self);

    /// Forces the stimulation and mirror pins to their idle level, whatever
    /// edge the stopped timer last fired.
    fn release_outputs(&mut self);

    /// Drives the burst indicator: high for the whole pulse train, low in the pause.
    fn set_indicator(&mut self, active: bool);
}
