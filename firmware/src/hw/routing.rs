//! PPI backend for the routing fabric.
//!
//! Output edges go through GPIOTE tasks so the pins toggle with no CPU
//! involvement; the SAADC and both SPIM start tasks are wired directly.

use embassy_nrf::gpio::OutputDrive;
use embassy_nrf::gpiote::{OutputChannel, OutputChannelPolarity};
use embassy_nrf::{Peri, gpio, pac, peripherals};
use stim_core::fabric::{ChannelId, ChannelMask, EventSource, FabricBackend, TaskSink};

use super::timers::{
    MIRROR_END_CC, MIRROR_START_CC, PRELOAD_CC, PULSE_END_CC, PULSE_START_CC, PulseTimerHw,
    StateTimerHw, TRANSITION_CC,
};
use crate::board;
use crate::polarity::{self, PinTask};

/// First PPI channel owned by the console UART.
const RESERVED_CHANNELS_FROM: ChannelId = 18;

/// Channel index outside the range the fabric may program.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct ReservedChannel(pub ChannelId);

impl core::fmt::Display for ReservedChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PPI channel {} is reserved", self.0)
    }
}

/// Start-task addresses of the two preload lines.
#[derive(Clone, Copy, Debug)]
pub struct PreloadTasks {
    pub channel_select: u32,
    pub amplitude: u32,
}

pub struct PpiBackend {
    _output: OutputChannel<'static>,
    _mirror: OutputChannel<'static>,
    preload: PreloadTasks,
}

impl PpiBackend {
    /// Claims the two GPIOTE channels driving the stimulation and mirror pins.
    pub fn new(
        output_channel: Peri<'static, peripherals::GPIOTE_CH0>,
        output_pin: Peri<'static, impl gpio::Pin>,
        mirror_channel: Peri<'static, peripherals::GPIOTE_CH1>,
        mirror_pin: Peri<'static, impl gpio::Pin>,
        preload: PreloadTasks,
    ) -> Self {
        let idle = if polarity::IDLE_HIGH {
            gpio::Level::High
        } else {
            gpio::Level::Low
        };
        let output = OutputChannel::new(
            output_channel,
            gpio::Output::new(output_pin, idle, OutputDrive::Standard),
            OutputChannelPolarity::Toggle,
        );
        let mirror = OutputChannel::new(
            mirror_channel,
            gpio::Output::new(mirror_pin, idle, OutputDrive::Standard),
            OutputChannelPolarity::Toggle,
        );

        Self {
            _output: output,
            _mirror: mirror,
            preload,
        }
    }
}

fn gpiote_task(channel: usize, task: PinTask) -> u32 {
    match task {
        PinTask::Set => pac::GPIOTE.tasks_set(channel).as_ptr() as u32,
        PinTask::Clr => pac::GPIOTE.tasks_clr(channel).as_ptr() as u32,
    }
}

fn pin_task_address(channel: usize, sink: TaskSink) -> u32 {
    gpiote_task(channel, polarity::pin_task(sink).unwrap_or(polarity::IDLE_TASK))
}

impl FabricBackend for PpiBackend {
    type Error = ReservedChannel;

    fn event_address(&self, event: EventSource) -> u32 {
        match event {
            EventSource::PulseStart => PulseTimerHw::event_address(PULSE_START_CC),
            EventSource::PulseEnd => PulseTimerHw::event_address(PULSE_END_CC),
            EventSource::MirrorStart => PulseTimerHw::event_address(MIRROR_START_CC),
            EventSource::MirrorEnd => PulseTimerHw::event_address(MIRROR_END_CC),
            EventSource::AdcDone => pac::SAADC.events_end().as_ptr() as u32,
            EventSource::StatePreload => StateTimerHw::event_address(PRELOAD_CC),
            EventSource::StateTransition => StateTimerHw::event_address(TRANSITION_CC),
        }
    }

    fn task_address(&self, task: TaskSink) -> u32 {
        match task {
            TaskSink::OutputAssert | TaskSink::OutputRelease => {
                pin_task_address(board::PULSE_GPIOTE_CHANNEL, task)
            }
            TaskSink::MirrorAssert | TaskSink::MirrorRelease => {
                pin_task_address(board::MIRROR_GPIOTE_CHANNEL, task)
            }
            TaskSink::AdcSample => pac::SAADC.tasks_sample().as_ptr() as u32,
            TaskSink::PulseCapture => PulseTimerHw::capture_task_address(),
            TaskSink::ChannelSelectStart => self.preload.channel_select,
            TaskSink::AmplitudeStart => self.preload.amplitude,
        }
    }

    fn setup_connection(
        &mut self,
        channel: ChannelId,
        event_addr: u32,
        task_addr: u32,
    ) -> Result<(), Self::Error> {
        if channel >= RESERVED_CHANNELS_FROM {
            return Err(ReservedChannel(channel));
        }

        let ch = pac::PPI.ch(usize::from(channel));
        ch.eep().write_value(event_addr);
        ch.tep().write_value(task_addr);
        Ok(())
    }

    fn enable(&mut self, mask: ChannelMask) {
        pac::PPI.chenset().write(|w| w.0 = mask);
    }
}

/// Drives both output pins to their idle level through GPIOTE.
pub fn release_outputs() {
    for channel in [board::PULSE_GPIOTE_CHANNEL, board::MIRROR_GPIOTE_CHANNEL] {
        let task = match polarity::IDLE_TASK {
            PinTask::Set => pac::GPIOTE.tasks_set(channel),
            PinTask::Clr => pac::GPIOTE.tasks_clr(channel),
        };
        task.write_value(1);
    }
}
