use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt::Display2Format;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::buffered_uarte::BufferedUarte;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::uarte;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use static_cell::StaticCell;
use stim_core::config::CycleConfig;
use stim_core::diagnostics::DiagnosticsRing;
use stim_core::fabric::{Fabric, RoutingTable};
use stim_core::preload::OutputPreloadChannel;
use stim_core::sequencer::{Sequencer, SequencerOutputs, SharedSequencer, TimingProfile};

use crate::board;
use crate::hw::adc::SenseAdc;
use crate::hw::preload::{LineInUse, SpimPreload};
use crate::hw::routing::{PpiBackend, PreloadTasks};
use crate::hw::timers::{PulseTimerHw, StateTimerHw};
use crate::hw::{self, Irqs};
use crate::line::ReplyLine;

mod command_task;
mod diagnostics_task;
mod reply_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub type FirmwareSequencer =
    SharedSequencer<'static, StateTimerHw, PulseTimerHw, SpimPreload, SpimPreload>;

const REPLY_QUEUE_DEPTH: usize = 4;

pub(crate) static CONFIG: CycleConfig = CycleConfig::new();
pub(crate) static DIAGNOSTICS: DiagnosticsRing = DiagnosticsRing::new();
pub(crate) static SEQUENCER: FirmwareSequencer = SharedSequencer::new();
pub(super) static REPLIES: Channel<CriticalSectionRawMutex, ReplyLine, REPLY_QUEUE_DEPTH> =
    Channel::new();

static CONSOLE_RX: StaticCell<[u8; board::CONSOLE_RX_BUFFER]> = StaticCell::new();
static CONSOLE_TX: StaticCell<[u8; board::CONSOLE_TX_BUFFER]> = StaticCell::new();

/// Reasons the firmware could not reach its idle loop.
#[derive(Clone, Copy, Debug, defmt::Format)]
enum BootFailure {
    OutputLine(LineInUse),
    Routing,
    ConsoleBuffers,
    Spawn(&'static str),
}

/// Peripherals that must stay alive for as long as the firmware runs.
struct Resident {
    _fabric: Fabric<PpiBackend>,
    _adc: SenseAdc,
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let _resident = match boot(spawner) {
        Ok(resident) => resident,
        Err(failure) => fatal(failure),
    };

    defmt::info!(
        "stimulator ready: {} Hz, width {}, {} pulses",
        CONFIG.frequency_hz(),
        CONFIG.pulse_width_units(),
        CONFIG.pulse_count()
    );

    core::future::pending::<()>().await;
}

fn boot(spawner: Spawner) -> Result<Resident, BootFailure> {
    let p = embassy_nrf::init(embassy_nrf::config::Config::default());

    let channel_select = SpimPreload::channel_select(p.SPIM2, p.P0_17, p.P0_13, p.P0_20)
        .map_err(BootFailure::OutputLine)?;
    let amplitude = SpimPreload::amplitude(p.SPIM3, p.P0_22, p.P0_24, p.P0_25)
        .map_err(BootFailure::OutputLine)?;

    let backend = PpiBackend::new(
        p.GPIOTE_CH0,
        p.P0_03,
        p.GPIOTE_CH1,
        p.P0_04,
        PreloadTasks {
            channel_select: channel_select.start_task_address(),
            amplitude: amplitude.start_task_address(),
        },
    );
    let table = RoutingTable::standard(board::MIRROR_ENABLED).map_err(|error| {
        defmt::error!("routing table: {}", Display2Format(&error));
        BootFailure::Routing
    })?;
    let mut fabric = Fabric::new(backend);
    let mask = fabric.install(&table).map_err(|error| {
        defmt::error!("routing install: {}", Display2Format(&error));
        BootFailure::Routing
    })?;
    defmt::info!(
        "routing: {} connections, mask {=u32:#x}",
        table.connections().len(),
        mask
    );

    let indicator = Output::new(p.P0_28, Level::Low, OutputDrive::Standard);
    let outputs = SequencerOutputs {
        state_timer: StateTimerHw::new(p.TIMER2),
        pulse_timer: PulseTimerHw::new(p.TIMER1, indicator),
        channel_select,
        amplitude,
    };
    SEQUENCER.install(Sequencer::new(
        &CONFIG,
        &DIAGNOSTICS,
        outputs,
        TimingProfile::DEFAULT,
    ));
    StateTimerHw::enable_interrupt();

    let adc = SenseAdc::start(p.SAADC, p.P0_02);

    let mut uart_config = uarte::Config::default();
    uart_config.baudrate = board::CONSOLE_BAUD;
    uart_config.parity = uarte::Parity::EXCLUDED;
    let rx_buffer = CONSOLE_RX
        .try_init([0; board::CONSOLE_RX_BUFFER])
        .ok_or(BootFailure::ConsoleBuffers)?;
    let tx_buffer = CONSOLE_TX
        .try_init([0; board::CONSOLE_TX_BUFFER])
        .ok_or(BootFailure::ConsoleBuffers)?;
    let console = BufferedUarte::new(
        p.UARTE0,
        p.TIMER0,
        p.PPI_CH18,
        p.PPI_CH19,
        p.PPI_GROUP0,
        p.P0_08,
        p.P0_06,
        Irqs,
        uart_config,
        rx_buffer,
        tx_buffer,
    );
    let (console_rx, console_tx) = console.split();

    spawner
        .spawn(command_task::run(console_rx))
        .map_err(|_| BootFailure::Spawn("command"))?;
    spawner
        .spawn(reply_task::run(console_tx))
        .map_err(|_| BootFailure::Spawn("reply"))?;
    spawner
        .spawn(diagnostics_task::run())
        .map_err(|_| BootFailure::Spawn("diagnostics"))?;

    Ok(Resident {
        _fabric: fabric,
        _adc: adc,
    })
}

/// Leaves the outputs silent and parks the core.
fn fatal(failure: BootFailure) -> ! {
    hw::silence_outputs();
    defmt::error!("boot failed: {}", failure);
    loop {
        cortex_m::asm::wfi();
    }
}
