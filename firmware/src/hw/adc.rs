//! Sense-input sampling correlated with the pulse timer.
//!
//! The SAADC is armed for one conversion at a time. Its SAMPLE task is fired
//! by the routing fabric on each pulse start, and the END event captures the
//! pulse timer so every reading carries the tick it completed at.

use embassy_nrf::interrupt::typelevel::{self, Handler};
use embassy_nrf::saadc::{self, ChannelConfig, Resolution, Saadc};
use embassy_nrf::{Peri, pac, peripherals};
use portable_atomic::{AtomicI16, AtomicU64, Ordering};
use stim_core::command::SampleReading;

use super::timers::PulseTimerHw;
use crate::codec;

/// DMA target for the single conversion result.
static RESULT: AtomicI16 = AtomicI16::new(0);

/// Latest reading packed as `VALID | capture << 16 | millivolts`; zero until
/// the first conversion completes.
static LATEST: AtomicU64 = AtomicU64::new(0);
const VALID: u64 = 1 << 63;

fn pack(reading: SampleReading) -> u64 {
    VALID | (u64::from(reading.capture_tick) << 16) | u64::from(reading.millivolts)
}

#[allow(clippy::cast_possible_truncation)]
fn unpack(word: u64) -> Option<SampleReading> {
    (word & VALID != 0).then(|| SampleReading {
        millivolts: word as u16,
        capture_tick: (word >> 16) as u32,
    })
}

/// Most recent reading, if any conversion has completed since boot.
pub fn latest_sample() -> Option<SampleReading> {
    unpack(LATEST.load(Ordering::Acquire))
}

fn arm_conversion() {
    let regs = pac::SAADC;
    regs.result().ptr().write_value(RESULT.as_ptr() as u32);
    regs.result().maxcnt().write(|w| w.set_maxcnt(1));
    regs.events_end().write_value(0);
    regs.intenset().write(|w| w.set_end(true));
    regs.tasks_start().write_value(1);
}

/// Keeps the SAADC configured; dropping it powers the converter down.
pub struct SenseAdc {
    _saadc: Saadc<'static, 1>,
}

impl SenseAdc {
    /// Configures AIN0 at 10 bits and arms the first conversion.
    pub fn start(
        saadc: Peri<'static, peripherals::SAADC>,
        input: Peri<'static, peripherals::P0_02>,
    ) -> Self {
        let mut config = saadc::Config::default();
        config.resolution = Resolution::_10BIT;
        let channel = ChannelConfig::single_ended(input);
        let driver = Saadc::new(saadc, super::Irqs, config, [channel]);

        arm_conversion();
        Self { _saadc: driver }
    }
}

/// Stores a finished conversion and re-arms the converter.
pub struct SampleDone;

impl Handler<typelevel::SAADC> for SampleDone {
    unsafe fn on_interrupt() {
        let regs = pac::SAADC;
        if regs.events_end().read() == 0 {
            return;
        }
        regs.events_end().write_value(0);

        let reading = SampleReading {
            millivolts: codec::raw_to_millivolts(RESULT.load(Ordering::Acquire)),
            capture_tick: PulseTimerHw::captured(),
        };
        LATEST.store(pack(reading), Ordering::Release);

        arm_conversion();
    }
}
