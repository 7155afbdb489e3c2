//! TIMER1 (pulse waveform) and TIMER2 (PULSE/PAUSE state) bindings.
//!
//! Both run at 1 MHz in 32-bit mode. The state timer restarts its count at the
//! transition compare through a short, so intervals are measured from the
//! hardware edge and ISR latency never accumulates into the period.

use embassy_nrf::gpio::{Level, Output};
use embassy_nrf::interrupt::typelevel::{Handler, Interrupt};
use embassy_nrf::pac::timer::vals::{Bitmode, Mode};
use embassy_nrf::{Peri, interrupt, pac, peripherals, timer};
use stim_core::sequencer::{PulseTimer, PulseWaveform, StateArm, StateTimer};

/// Prescaler giving 16 MHz / 2^4 = 1 MHz.
const PRESCALER_1MHZ: u8 = 4;

pub const TRANSITION_CC: usize = 0;
pub const PRELOAD_CC: usize = 1;

pub const PULSE_START_CC: usize = 0;
pub const PULSE_END_CC: usize = 1;
pub const MIRROR_START_CC: usize = 2;
pub const MIRROR_END_CC: usize = 3;
/// Captures the counter when a conversion completes.
pub const CAPTURE_CC: usize = 4;
pub const WRAP_CC: usize = 5;

fn setup_counter(regs: pac::timer::Timer) {
    regs.tasks_stop().write_value(1);
    regs.tasks_clear().write_value(1);
    regs.mode().write(|w| w.set_mode(Mode::TIMER));
    regs.bitmode().write(|w| w.set_bitmode(Bitmode::_32BIT));
    regs.prescaler().write(|w| w.set_prescaler(PRESCALER_1MHZ));
}

/// PULSE/PAUSE clock on TIMER2.
pub struct StateTimerHw {
    _timer: Peri<'static, peripherals::TIMER2>,
    running: bool,
}

impl StateTimerHw {
    const REGS: pac::timer::Timer = pac::TIMER2;

    pub fn new(timer: Peri<'static, peripherals::TIMER2>) -> Self {
        let regs = Self::REGS;
        setup_counter(regs);
        regs.shorts().write(|w| w.set_compare_clear(TRANSITION_CC, true));
        regs.intenset().write(|w| {
            w.set_compare(TRANSITION_CC, true);
            w.set_compare(PRELOAD_CC, true);
        });

        Self {
            _timer: timer,
            running: false,
        }
    }

    /// Address of the compare event on `cc`.
    pub fn event_address(cc: usize) -> u32 {
        Self::REGS.events_compare(cc).as_ptr() as u32
    }

    /// Unmasks the state timer interrupt above every executor priority.
    pub fn enable_interrupt() {
        type Irq = <peripherals::TIMER2 as timer::Instance>::Interrupt;
        Irq::set_priority(interrupt::Priority::P1);
        Irq::unpend();
        // SAFETY: the handler only touches state reached through critical sections.
        unsafe { Irq::enable() };
    }
}

impl StateTimer for StateTimerHw {
    fn arm(&mut self, arm: StateArm) {
        let regs = Self::REGS;
        regs.cc(PRELOAD_CC).write_value(arm.preload_ticks);
        regs.cc(TRANSITION_CC).write_value(arm.transition_ticks);

        if !self.running {
            regs.events_compare(TRANSITION_CC).write_value(0);
            regs.events_compare(PRELOAD_CC).write_value(0);
            regs.tasks_clear().write_value(1);
            regs.tasks_start().write_value(1);
            self.running = true;
        }
    }

    fn disable(&mut self) {
        let regs = Self::REGS;
        regs.tasks_stop().write_value(1);
        regs.tasks_clear().write_value(1);
        regs.events_compare(TRANSITION_CC).write_value(0);
        regs.events_compare(PRELOAD_CC).write_value(0);
        self.running = false;
    }
}

/// Compare handler for TIMER2. Preload is dispatched before transition when
/// both are pending.
pub struct StateTimerIrq;

impl Handler<<peripherals::TIMER2 as timer::Instance>::Interrupt> for StateTimerIrq {
    unsafe fn on_interrupt() {
        let regs = StateTimerHw::REGS;

        if regs.events_compare(PRELOAD_CC).read() != 0 {
            regs.events_compare(PRELOAD_CC).write_value(0);
            crate::runtime::SEQUENCER.with(|sequencer| sequencer.on_preload_event());
        }

        if regs.events_compare(TRANSITION_CC).read() != 0 {
            regs.events_compare(TRANSITION_CC).write_value(0);
            crate::runtime::SEQUENCER.with(|sequencer| sequencer.on_transition_event());
        }
    }
}

/// Waveform timer on TIMER1. Its compare events only reach the outputs through
/// the routing fabric; no interrupt is enabled. The wrap compare clears and
/// stops the counter, so each restart plays exactly one pulse.
pub struct PulseTimerHw {
    _timer: Peri<'static, peripherals::TIMER1>,
    indicator: Output<'static>,
}

impl PulseTimerHw {
    const REGS: pac::timer::Timer = pac::TIMER1;

    pub fn new(timer: Peri<'static, peripherals::TIMER1>, indicator: Output<'static>) -> Self {
        let regs = Self::REGS;
        setup_counter(regs);
        regs.shorts().write(|w| {
            w.set_compare_clear(WRAP_CC, true);
            w.set_compare_stop(WRAP_CC, true);
        });

        Self {
            _timer: timer,
            indicator,
        }
    }

    pub fn event_address(cc: usize) -> u32 {
        Self::REGS.events_compare(cc).as_ptr() as u32
    }

    pub fn capture_task_address() -> u32 {
        Self::REGS.tasks_capture(CAPTURE_CC).as_ptr() as u32
    }

    /// Counter value latched by the last capture.
    pub fn captured() -> u32 {
        Self::REGS.cc(CAPTURE_CC).read()
    }
}

impl PulseTimer for PulseTimerHw {
    fn configure(&mut self, waveform: PulseWaveform) {
        let regs = Self::REGS;
        regs.tasks_stop().write_value(1);
        regs.tasks_clear().write_value(1);
        regs.cc(PULSE_START_CC).write_value(waveform.start);
        regs.cc(PULSE_END_CC).write_value(waveform.end);
        regs.cc(MIRROR_START_CC).write_value(waveform.mirror_start);
        regs.cc(MIRROR_END_CC).write_value(waveform.mirror_end);
        regs.cc(WRAP_CC).write_value(waveform.wrap);
    }

    fn enable(&mut self) {
        Self::REGS.tasks_start().write_value(1);
    }

    fn disable(&mut self) {
        Self::REGS.tasks_stop().write_value(1);
    }

    fn restart(&mut self) {
        let regs = Self::REGS;
        regs.tasks_clear().write_value(1);
        regs.tasks_start().write_value(1);
    }

    fn release_outputs(&mut self) {
        super::routing::release_outputs();
    }

    fn set_indicator(&mut self, active: bool) {
        self.indicator
            .set_level(if active { Level::High } else { Level::Low });
    }
}
