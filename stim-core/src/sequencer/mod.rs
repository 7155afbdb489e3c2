//! PULSE/PAUSE sequencer driven by the state timer's compare events.
//!
//! The sequencer owns the pulse index and a snapshot of the configuration it is
//! currently playing. It only swaps that snapshot at a transition, after the
//! update flag has been consumed, so a pulse always runs to completion with the
//! parameters it started with.
//!
//! Both execution contexts reach the sequencer through [`SharedSequencer`]: the
//! timing ISR for compare events, the command context for start and stop.

pub mod timers;
pub mod transition;

use core::cell::RefCell;

use critical_section::Mutex;

use crate::config::{CycleConfig, CycleSnapshot};
use crate::diagnostics::{DiagnosticEvent, DiagnosticsRing};
use crate::preload::{OutputPair, OutputPreloadChannel, OutputRole};

pub use timers::{PulseTimer, PulseWaveform, StateArm, StateTimer, TimingProfile};
pub use transition::{
    Phase, Position, PulseTimerAction, RearmParams, Transition, next_transition,
    upcoming_outputs,
};

/// Polls allowed for an immediate write to settle before the first prepare.
const IMMEDIATE_SETTLE_POLLS: u32 = 1_000;

/// Result of a start or stop request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunChange {
    Changed,
    /// Already in the requested state; nothing was done.
    Unchanged,
}

/// Start/stop surface used by the command layer.
pub trait RunControl {
    fn start(&mut self) -> RunChange;
    fn stop(&mut self) -> RunChange;
    fn is_running(&self) -> bool;
    fn transition_count(&self) -> u32;
}

/// ISR-owned progress through the cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CycleState {
    pub position: Position,
    pub transition_count: u32,
    pub preload_count: u32,
    pub running: bool,
}

impl CycleState {
    const IDLE: Self = Self {
        position: Position::PAUSE,
        transition_count: 0,
        preload_count: 0,
        running: false,
    };
}

/// Peripherals driven by the sequencer.
pub struct SequencerOutputs<S, P, M, A> {
    pub state_timer: S,
    pub pulse_timer: P,
    pub channel_select: M,
    pub amplitude: A,
}

pub struct Sequencer<'a, S, P, M, A> {
    config: &'a CycleConfig,
    diagnostics: &'a DiagnosticsRing,
    outputs: SequencerOutputs<S, P, M, A>,
    profile: TimingProfile,
    active: CycleSnapshot,
    state: CycleState,
}

impl<'a, S, P, M, A> Sequencer<'a, S, P, M, A>
where
    S: StateTimer,
    P: PulseTimer,
    M: OutputPreloadChannel,
    A: OutputPreloadChannel,
{
    /// Creates an idle sequencer. The hardware is left untouched until [`Self::start`].
    pub fn new(
        config: &'a CycleConfig,
        diagnostics: &'a DiagnosticsRing,
        outputs: SequencerOutputs<S, P, M, A>,
        profile: TimingProfile,
    ) -> Self {
        Self {
            config,
            diagnostics,
            outputs,
            profile,
            active: config.snapshot(),
            state: CycleState::IDLE,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Configuration currently being played.
    pub fn active_config(&self) -> &CycleSnapshot {
        &self.active
    }

    pub fn outputs(&self) -> &SequencerOutputs<S, P, M, A> {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut SequencerOutputs<S, P, M, A> {
        &mut self.outputs
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Begins a burst at pulse 0 with the latest configuration. A no-op when
    /// already running.
    pub fn start(&mut self) -> RunChange {
        if self.state.running {
            return RunChange::Unchanged;
        }

        let _ = self.config.test_and_clear_update_flag();
        self.active = self.config.snapshot();
        let waveform = self.waveform();
        self.outputs.pulse_timer.configure(waveform);

        self.state.running = true;
        self.state.position = Position::FIRST_PULSE;
        self.outputs.pulse_timer.set_indicator(true);
        let first = self.active.output_for(0);
        self.write_now(first);
        self.wait_for_immediate_writes();

        self.outputs.pulse_timer.restart();
        self.outputs.pulse_timer.enable();
        let upcoming = upcoming_outputs(Position::FIRST_PULSE, &self.active);
        self.arm(self.active.single_pulse_us(), upcoming);
        self.record(DiagnosticEvent::Started);
        RunChange::Changed
    }

    /// Halts both timers and silences the outputs. Safe in any state; the
    /// outputs are silenced even when already stopped. The pulse timer may
    /// halt between its assert and release edges, so the pins are forced idle.
    pub fn stop(&mut self) -> RunChange {
        self.outputs.state_timer.disable();
        self.outputs.pulse_timer.disable();
        self.outputs.pulse_timer.release_outputs();

        let was_running = self.state.running;
        self.state.running = false;
        self.state.position = Position::PAUSE;

        self.write_now(OutputPair::SILENT);
        self.outputs.pulse_timer.set_indicator(false);

        if was_running {
            self.record(DiagnosticEvent::Stopped);
            RunChange::Changed
        } else {
            RunChange::Unchanged
        }
    }

    /// Preload compare fired. The staged transfers were started by the
    /// routing fabric; only the instant is counted here.
    pub fn on_preload_event(&mut self) {
        if self.state.running {
            self.state.preload_count = self.state.preload_count.wrapping_add(1);
        }
    }

    /// Transition compare fired: apply any pending update, advance the state
    /// machine and re-arm the timers for the next state.
    pub fn on_transition_event(&mut self) {
        if !self.state.running {
            return;
        }

        self.state.transition_count = self.state.transition_count.wrapping_add(1);

        if self.config.test_and_clear_update_flag() {
            self.apply_update();
        }

        let Transition { next, rearm } = next_transition(self.state.position, &self.active);
        self.state.position = next;

        match rearm.pulse_timer {
            PulseTimerAction::Restart => self.outputs.pulse_timer.restart(),
            PulseTimerAction::Enable => {
                self.outputs.pulse_timer.restart();
                self.outputs.pulse_timer.enable();
                self.outputs.pulse_timer.set_indicator(true);
            }
            PulseTimerAction::Disable => {
                self.outputs.pulse_timer.disable();
                self.outputs.pulse_timer.set_indicator(false);
            }
        }

        self.arm(rearm.interval_us, rearm.upcoming);
    }

    fn apply_update(&mut self) {
        self.active = self.config.snapshot();
        let waveform = self.waveform();
        self.outputs.pulse_timer.configure(waveform);
        if self.state.position.phase == Phase::Pulse {
            self.outputs.pulse_timer.enable();
        }

        self.record(DiagnosticEvent::UpdateApplied {
            frequency_hz: self.active.frequency_hz,
            pulse_width_units: self.active.pulse_width_units,
            pulse_count: self.active.pulse_count,
        });
    }

    fn arm(&mut self, interval_us: u32, upcoming: OutputPair) {
        self.outputs
            .state_timer
            .arm(StateArm::new(interval_us, self.profile));
        self.stage(upcoming);
    }

    // A refused prepare leaves the previous value latched for that slot.
    fn stage(&mut self, pair: OutputPair) {
        let results = [
            (
                OutputRole::ChannelSelect,
                self.outputs.channel_select.prepare(pair.pattern),
            ),
            (
                OutputRole::Amplitude,
                self.outputs.amplitude.prepare(pair.amplitude),
            ),
        ];

        for (role, result) in results {
            if let Err(error) = result {
                self.record(DiagnosticEvent::PreloadDropped {
                    role,
                    phase: self.state.position.phase,
                    pulse_index: self.state.position.pulse_index,
                    error,
                });
            }
        }
    }

    fn write_now(&mut self, pair: OutputPair) {
        self.outputs.channel_select.abort();
        self.outputs.amplitude.abort();

        let results = [
            (
                OutputRole::ChannelSelect,
                self.outputs.channel_select.write_immediate(pair.pattern),
            ),
            (
                OutputRole::Amplitude,
                self.outputs.amplitude.write_immediate(pair.amplitude),
            ),
        ];

        for (role, result) in results {
            if let Err(error) = result {
                self.record(DiagnosticEvent::ImmediateWriteFailed { role, error });
            }
        }
    }

    // The first prepare would be refused while the immediate transfer is in flight.
    fn wait_for_immediate_writes(&self) {
        for _ in 0..IMMEDIATE_SETTLE_POLLS {
            if self.outputs.channel_select.is_ready() && self.outputs.amplitude.is_ready() {
                return;
            }
            core::hint::spin_loop();
        }
    }

    fn waveform(&self) -> PulseWaveform {
        PulseWaveform::for_width(self.active.pulse_width_units, self.profile.clock)
    }

    fn record(&self, event: DiagnosticEvent) {
        self.diagnostics.push(self.state.transition_count, event);
    }
}

impl<S, P, M, A> RunControl for Sequencer<'_, S, P, M, A>
where
    S: StateTimer,
    P: PulseTimer,
    M: OutputPreloadChannel,
    A: OutputPreloadChannel,
{
    fn start(&mut self) -> RunChange {
        Sequencer::start(self)
    }

    fn stop(&mut self) -> RunChange {
        Sequencer::stop(self)
    }

    fn is_running(&self) -> bool {
        Sequencer::is_running(self)
    }

    fn transition_count(&self) -> u32 {
        self.state.transition_count
    }
}

/// Sequencer slot shared between the timing ISR and the command context.
///
/// Every access runs inside a critical section, so on a single core the
/// timing interrupt can never preempt a start or stop halfway through.
pub struct SharedSequencer<'a, S, P, M, A> {
    inner: Mutex<RefCell<Option<Sequencer<'a, S, P, M, A>>>>,
}

impl<'a, S, P, M, A> SharedSequencer<'a, S, P, M, A> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Stores the sequencer, returning any previously installed one.
    pub fn install(&self, sequencer: Sequencer<'a, S, P, M, A>) -> Option<Sequencer<'a, S, P, M, A>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(sequencer))
    }

    /// Runs `f` on the sequencer inside a critical section. Returns `None`
    /// before [`Self::install`].
    pub fn with<R>(&self, f: impl FnOnce(&mut Sequencer<'a, S, P, M, A>) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }
}

impl<S, P, M, A> Default for SharedSequencer<'_, S, P, M, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P, M, A> RunControl for &SharedSequencer<'_, S, P, M, A>
where
    S: StateTimer,
    P: PulseTimer,
    M: OutputPreloadChannel,
    A: OutputPreloadChannel,
{
    fn start(&mut self) -> RunChange {
        self.with(Sequencer::start).unwrap_or(RunChange::Unchanged)
    }

    fn stop(&mut self) -> RunChange {
        self.with(Sequencer::stop).unwrap_or(RunChange::Unchanged)
    }

    fn is_running(&self) -> bool {
        self.with(|sequencer| sequencer.is_running())
            .unwrap_or(false)
    }

    fn transition_count(&self) -> u32 {
        self.with(|sequencer| sequencer.state().transition_count)
            .unwrap_or(0)
    }
}
