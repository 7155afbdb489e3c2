//! nRF52833 bindings for the sequencer, the routing fabric and the sense ADC.

pub mod adc;
pub mod preload;
pub mod routing;
pub mod timers;

use embassy_nrf::{bind_interrupts, buffered_uarte, pac, peripherals, saadc, spim};

bind_interrupts!(pub struct Irqs {
    TIMER2 => timers::StateTimerIrq;
    SPIM2_SPIS2_SPI2 => preload::ChannelSelectEnd, spim::InterruptHandler<peripherals::SPIM2>;
    SPIM3 => preload::AmplitudeEnd, spim::InterruptHandler<peripherals::SPIM3>;
    SAADC => adc::SampleDone, saadc::InterruptHandler;
    UARTE0_UART0 => buffered_uarte::InterruptHandler<peripherals::UARTE0>;
});

/// Halts both timers and drives the outputs idle without going through the
/// sequencer. Used when the firmware cannot continue.
pub fn silence_outputs() {
    pac::TIMER2.tasks_stop().write_value(1);
    pac::TIMER1.tasks_stop().write_value(1);
    routing::release_outputs();
}
