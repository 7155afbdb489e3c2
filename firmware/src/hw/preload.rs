//! SPIM-backed preload channels for the channel-select MUX (SPIM2) and the
//! amplitude DAC (SPIM3).
//!
//! `prepare` leaves a fully configured transfer sitting in the peripheral; the
//! routing fabric fires its START task at the preload instant. Completion is
//! observed on the END event, which also strobes the device latch so the new
//! value appears on the outputs.

use core::sync::atomic::compiler_fence;

use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::typelevel::Handler;
use embassy_nrf::spim::{self, Spim};
use embassy_nrf::{Peri, gpio, pac, peripherals};
use portable_atomic::{AtomicBool, Ordering};
use static_cell::StaticCell;
use stim_core::preload::{OutputPreloadChannel, OutputRole, PreloadError};

use crate::board;
use crate::codec::{self, FRAME_LEN};

#[allow(clippy::cast_possible_truncation)]
const FRAME_MAXCNT: u16 = FRAME_LEN as u16;

/// Register block, latch pin and completion flag of one preload line.
pub struct PreloadLine {
    regs: pac::spim::Spim,
    latch_pin: usize,
    pending: AtomicBool,
    frame: StaticCell<[u8; FRAME_LEN]>,
}

impl PreloadLine {
    const fn new(regs: pac::spim::Spim, latch_pin: usize) -> Self {
        Self {
            regs,
            latch_pin,
            pending: AtomicBool::new(false),
            frame: StaticCell::new(),
        }
    }

    /// Finishes a completed transfer: clears END and strobes the latch.
    /// Returns true once nothing is outstanding.
    fn settle(&self) -> bool {
        if !self.pending.load(Ordering::Acquire) {
            return true;
        }
        if self.regs.events_end().read() == 0 {
            return false;
        }

        self.regs.events_end().write_value(0);
        self.strobe_latch();
        self.pending.store(false, Ordering::Release);
        true
    }

    fn strobe_latch(&self) {
        pac::P0.outclr().write(|w| w.set_pin(self.latch_pin, true));
        pac::P0.outset().write(|w| w.set_pin(self.latch_pin, true));
    }
}

pub static CHANNEL_SELECT_LINE: PreloadLine = PreloadLine::new(pac::SPIM2, board::MUX_LATCH_PIN);
pub static AMPLITUDE_LINE: PreloadLine = PreloadLine::new(pac::SPIM3, board::DAC_LATCH_PIN);

/// Raised when a line's transfer buffer was already claimed.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct LineInUse;

fn bus_config() -> spim::Config {
    let mut config = spim::Config::default();
    config.frequency = spim::Frequency::M8;
    config.mode = spim::MODE_0;
    config
}

/// One preloaded output device.
pub struct SpimPreload {
    line: &'static PreloadLine,
    role: OutputRole,
    frame: &'static mut [u8; FRAME_LEN],
    _spim: Spim<'static>,
    _latch: Output<'static>,
}

impl SpimPreload {
    /// Channel-select MUX on SPIM2.
    pub fn channel_select(
        spim: Peri<'static, peripherals::SPIM2>,
        sck: Peri<'static, impl gpio::Pin>,
        mosi: Peri<'static, impl gpio::Pin>,
        latch: Peri<'static, impl gpio::Pin>,
    ) -> Result<Self, LineInUse> {
        let driver = Spim::new_txonly(spim, super::Irqs, sck, mosi, bus_config());
        Self::new(&CHANNEL_SELECT_LINE, OutputRole::ChannelSelect, driver, latch)
    }

    /// Amplitude DAC on SPIM3.
    pub fn amplitude(
        spim: Peri<'static, peripherals::SPIM3>,
        sck: Peri<'static, impl gpio::Pin>,
        mosi: Peri<'static, impl gpio::Pin>,
        latch: Peri<'static, impl gpio::Pin>,
    ) -> Result<Self, LineInUse> {
        let driver = Spim::new_txonly(spim, super::Irqs, sck, mosi, bus_config());
        Self::new(&AMPLITUDE_LINE, OutputRole::Amplitude, driver, latch)
    }

    fn new(
        line: &'static PreloadLine,
        role: OutputRole,
        driver: Spim<'static>,
        latch: Peri<'static, impl gpio::Pin>,
    ) -> Result<Self, LineInUse> {
        let frame = line.frame.try_init([0; FRAME_LEN]).ok_or(LineInUse)?;
        Ok(Self {
            line,
            role,
            frame,
            _spim: driver,
            _latch: Output::new(latch, Level::High, OutputDrive::Standard),
        })
    }
}

impl OutputPreloadChannel for SpimPreload {
    fn prepare(&mut self, value: u16) -> Result<(), PreloadError> {
        if !self.line.settle() {
            return Err(PreloadError::Busy);
        }

        *self.frame = codec::frame(self.role, value);
        compiler_fence(Ordering::SeqCst);

        let regs = self.line.regs;
        regs.txd().ptr().write_value(self.frame.as_ptr() as u32);
        regs.txd().maxcnt().write(|w| w.set_maxcnt(FRAME_MAXCNT));
        regs.rxd().maxcnt().write(|w| w.set_maxcnt(0));
        regs.events_end().write_value(0);
        regs.intenset().write(|w| w.set_end(true));
        self.line.pending.store(true, Ordering::Release);
        Ok(())
    }

    fn write_immediate(&mut self, value: u16) -> Result<(), PreloadError> {
        self.abort();
        self.prepare(value)?;
        self.line.regs.tasks_start().write_value(1);
        Ok(())
    }

    fn start_task_address(&self) -> u32 {
        self.line.regs.tasks_start().as_ptr() as u32
    }

    fn abort(&mut self) {
        let regs = self.line.regs;
        regs.tasks_stop().write_value(1);
        regs.events_end().write_value(0);
        self.line.pending.store(false, Ordering::Release);
    }

    fn is_ready(&self) -> bool {
        self.line.settle()
    }
}

/// END handler for the MUX line, bound ahead of the driver's own handler.
pub struct ChannelSelectEnd;

impl Handler<<peripherals::SPIM2 as spim::Instance>::Interrupt> for ChannelSelectEnd {
    unsafe fn on_interrupt() {
        CHANNEL_SELECT_LINE.settle();
    }
}

/// END handler for the DAC line.
pub struct AmplitudeEnd;

impl Handler<<peripherals::SPIM3 as spim::Instance>::Interrupt> for AmplitudeEnd {
    unsafe fn on_interrupt() {
        AMPLITUDE_LINE.settle();
    }
}
