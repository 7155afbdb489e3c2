//! Host stand-ins for the timers and output devices, plus a discrete-time
//! driver that fires the compare events the hardware would.

use stim_core::preload::{OutputPair, OutputPreloadChannel, PreloadError};
use stim_core::sequencer::{
    Phase, Position, PulseTimer, PulseWaveform, SequencerOutputs, SharedSequencer, StateArm,
    StateTimer, TimingProfile,
};

pub type SimSequencer<'a> =
    SharedSequencer<'a, SimStateTimer, SimPulseTimer, SimPreload, SimPreload>;

pub const PROFILE: TimingProfile = TimingProfile::DEFAULT;

#[derive(Debug, Default)]
pub struct SimStateTimer {
    pending: Option<StateArm>,
    running: bool,
}

impl SimStateTimer {
    fn take_armed(&mut self) -> Option<StateArm> {
        self.pending.take()
    }
}

impl StateTimer for SimStateTimer {
    fn arm(&mut self, arm: StateArm) {
        self.pending = Some(arm);
        self.running = true;
    }

    fn disable(&mut self) {
        self.pending = None;
        self.running = false;
    }
}

#[derive(Debug, Default)]
pub struct SimPulseTimer {
    waveform: Option<PulseWaveform>,
    enabled: bool,
    indicator: bool,
}

impl SimPulseTimer {
    pub fn waveform(&self) -> Option<PulseWaveform> {
        self.waveform
    }

    /// Level of the run indicator pin.
    pub fn indicator(&self) -> bool {
        self.indicator
    }
}

impl PulseTimer for SimPulseTimer {
    fn configure(&mut self, waveform: PulseWaveform) {
        self.enabled = false;
        self.waveform = Some(waveform);
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn restart(&mut self) {}

    fn release_outputs(&mut self) {}

    fn set_indicator(&mut self, active: bool) {
        self.indicator = active;
    }
}

/// Output device with a one-deep transfer slot.
#[derive(Debug, Default)]
pub struct SimPreload {
    held: Option<u16>,
    latched: u16,
    transfers: u32,
}

impl SimPreload {
    fn fire(&mut self) {
        if let Some(value) = self.held.take() {
            self.latched = value;
            self.transfers += 1;
        }
    }

    pub fn latched(&self) -> u16 {
        self.latched
    }

    /// Values that reached the device so far.
    pub fn transfers(&self) -> u32 {
        self.transfers
    }
}

impl OutputPreloadChannel for SimPreload {
    fn prepare(&mut self, value: u16) -> Result<(), PreloadError> {
        if self.held.is_some() {
            return Err(PreloadError::Busy);
        }
        self.held = Some(value);
        Ok(())
    }

    fn write_immediate(&mut self, value: u16) -> Result<(), PreloadError> {
        self.held = None;
        self.latched = value;
        self.transfers += 1;
        Ok(())
    }

    fn start_task_address(&self) -> u32 {
        0
    }

    fn abort(&mut self) {
        self.held = None;
    }

    fn is_ready(&self) -> bool {
        self.held.is_none()
    }
}

#[must_use]
pub fn outputs() -> SequencerOutputs<SimStateTimer, SimPulseTimer, SimPreload, SimPreload> {
    SequencerOutputs {
        state_timer: SimStateTimer::default(),
        pulse_timer: SimPulseTimer::default(),
        channel_select: SimPreload::default(),
        amplitude: SimPreload::default(),
    }
}

/// Something observable that happened during a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimEvent {
    Preload {
        at_us: u64,
    },
    Transition {
        at_us: u64,
        position: Position,
        outputs: OutputPair,
        pulse_timer_enabled: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub transitions: u32,
    pub pulses: u32,
    pub pauses: u32,
}

#[derive(Clone, Copy, Debug)]
struct Schedule {
    base_us: u64,
    arm: StateArm,
    preload_done: bool,
}

impl Schedule {
    fn next(&self) -> (u64, bool) {
        let ticks_per_us = u64::from(PROFILE.clock.ticks_per_us());
        if self.preload_done {
            (
                self.base_us + u64::from(self.arm.transition_ticks) / ticks_per_us,
                true,
            )
        } else {
            (
                self.base_us + u64::from(self.arm.preload_ticks) / ticks_per_us,
                false,
            )
        }
    }
}

/// Virtual clock that plays the state timer's compare events in order.
#[derive(Debug, Default)]
pub struct Simulator {
    now_us: u64,
    schedule: Option<Schedule>,
}

impl Simulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Advances virtual time by `duration_us`, firing every compare event
    /// that falls inside the window.
    pub fn run_for(
        &mut self,
        sequencer: &SimSequencer<'_>,
        duration_us: u64,
        mut observe: impl FnMut(SimEvent),
    ) -> RunSummary {
        let deadline = self.now_us.saturating_add(duration_us);
        let mut summary = RunSummary::default();

        loop {
            self.sync(sequencer);
            let Some(schedule) = self.schedule.as_mut() else {
                break;
            };
            let (at_us, is_transition) = schedule.next();
            if at_us > deadline {
                break;
            }
            self.now_us = at_us;

            if is_transition {
                self.schedule = None;
                let played = sequencer.with(|seq| {
                    seq.on_transition_event();
                    let outputs = seq.outputs();
                    (
                        seq.state().position,
                        OutputPair::new(
                            outputs.channel_select.latched(),
                            outputs.amplitude.latched(),
                        ),
                        outputs.pulse_timer.enabled,
                    )
                });
                if let Some((position, outputs, pulse_timer_enabled)) = played {
                    summary.transitions += 1;
                    match position.phase {
                        Phase::Pulse => summary.pulses += 1,
                        Phase::Pause => summary.pauses += 1,
                    }
                    observe(SimEvent::Transition {
                        at_us,
                        position,
                        outputs,
                        pulse_timer_enabled,
                    });
                }
            } else {
                schedule.preload_done = true;
                sequencer.with(|seq| {
                    let outputs = seq.outputs_mut();
                    outputs.channel_select.fire();
                    outputs.amplitude.fire();
                    seq.on_preload_event();
                });
                observe(SimEvent::Preload { at_us });
            }
        }

        self.now_us = deadline;
        summary
    }

    // Picks up a re-arm or disable issued since the last event.
    fn sync(&mut self, sequencer: &SimSequencer<'_>) {
        let armed = sequencer.with(|seq| {
            let timer = &mut seq.outputs_mut().state_timer;
            (timer.running, timer.take_armed())
        });

        match armed {
            Some((true, Some(arm))) => {
                self.schedule = Some(Schedule {
                    base_us: self.now_us,
                    arm,
                    preload_done: false,
                });
            }
            Some((false, _)) | None => self.schedule = None,
            Some((true, None)) => {}
        }
    }
}
