#![allow(dead_code)]

use stim_core::config::CycleConfig;
use stim_core::diagnostics::{DiagnosticEvent, DiagnosticsRing};
use stim_core::preload::{OutputPair, OutputPreloadChannel, PreloadError};
use stim_core::sequencer::{
    PulseTimer, PulseWaveform, Sequencer, SequencerOutputs, StateArm, StateTimer, TimingProfile,
};

#[derive(Debug, Default)]
pub struct MockStateTimer {
    pub armed: Vec<StateArm>,
    pub running: bool,
    pub disables: usize,
}

impl MockStateTimer {
    pub fn last_arm(&self) -> StateArm {
        *self.armed.last().expect("state timer armed at least once")
    }
}

impl StateTimer for MockStateTimer {
    fn arm(&mut self, arm: StateArm) {
        self.armed.push(arm);
        self.running = true;
    }

    fn disable(&mut self) {
        self.running = false;
        self.disables += 1;
    }
}

#[derive(Debug, Default)]
pub struct MockPulseTimer {
    pub waveform: Option<PulseWaveform>,
    pub configures: usize,
    pub enabled: bool,
    pub restarts: usize,
    pub indicator: bool,
    /// Stimulation pin driven to its active level.
    pub output_asserted: bool,
    pub releases: usize,
}

impl MockPulseTimer {
    /// Fires the first edge of the loaded waveform, as the timer does
    /// `start` ticks after it begins counting.
    pub fn fire_pulse_start(&mut self) {
        if self.enabled && self.waveform.is_some() {
            self.output_asserted = true;
        }
    }
}

impl PulseTimer for MockPulseTimer {
    fn configure(&mut self, waveform: PulseWaveform) {
        self.enabled = false;
        self.waveform = Some(waveform);
        self.configures += 1;
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }

    fn release_outputs(&mut self) {
        self.output_asserted = false;
        self.releases += 1;
    }

    fn set_indicator(&mut self, active: bool) {
        self.indicator = active;
    }
}

/// Preload channel that holds one prepared value until [`MockPreload::fire`].
#[derive(Debug, Default)]
pub struct MockPreload {
    pub address: u32,
    pub held: Option<u16>,
    pub latched: Option<u16>,
    pub prepared: Vec<u16>,
    pub immediate: Vec<u16>,
    pub aborts: usize,
    pub force_busy: bool,
}

impl MockPreload {
    pub fn with_address(address: u32) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Routing fabric started the held transfer.
    pub fn fire(&mut self) {
        if let Some(value) = self.held.take() {
            self.latched = Some(value);
        }
    }
}

impl OutputPreloadChannel for MockPreload {
    fn prepare(&mut self, value: u16) -> Result<(), PreloadError> {
        if self.force_busy || self.held.is_some() {
            return Err(PreloadError::Busy);
        }
        self.held = Some(value);
        self.prepared.push(value);
        Ok(())
    }

    fn write_immediate(&mut self, value: u16) -> Result<(), PreloadError> {
        self.held = None;
        self.latched = Some(value);
        self.immediate.push(value);
        Ok(())
    }

    fn start_task_address(&self) -> u32 {
        self.address
    }

    fn abort(&mut self) {
        self.held = None;
        self.aborts += 1;
    }

    fn is_ready(&self) -> bool {
        self.held.is_none()
    }
}

pub type TestOutputs = SequencerOutputs<MockStateTimer, MockPulseTimer, MockPreload, MockPreload>;
pub type TestSequencer<'a> =
    Sequencer<'a, MockStateTimer, MockPulseTimer, MockPreload, MockPreload>;

pub fn outputs() -> TestOutputs {
    SequencerOutputs {
        state_timer: MockStateTimer::default(),
        pulse_timer: MockPulseTimer::default(),
        channel_select: MockPreload::with_address(0x4002_3010),
        amplitude: MockPreload::with_address(0x4002_F010),
    }
}

pub fn sequencer<'a>(config: &'a CycleConfig, diagnostics: &'a DiagnosticsRing) -> TestSequencer<'a> {
    Sequencer::new(config, diagnostics, outputs(), TimingProfile::DEFAULT)
}

/// Plays out the current state: the preload instant fires the held
/// transfers, then the transition compare fires.
pub fn advance_state(sequencer: &mut TestSequencer<'_>) {
    let outputs = sequencer.outputs_mut();
    outputs.channel_select.fire();
    outputs.amplitude.fire();
    sequencer.on_preload_event();
    sequencer.on_transition_event();
}

/// Pair currently driven by the two output devices.
pub fn latched(sequencer: &TestSequencer<'_>) -> OutputPair {
    let outputs = sequencer.outputs();
    OutputPair::new(
        outputs.channel_select.latched.unwrap_or_default(),
        outputs.amplitude.latched.unwrap_or_default(),
    )
}

pub fn count_events(
    diagnostics: &DiagnosticsRing,
    mut matches: impl FnMut(&DiagnosticEvent) -> bool,
) -> usize {
    let mut count = 0;
    diagnostics.drain(|record| {
        if matches(&record.event) {
            count += 1;
        }
    });
    count
}
