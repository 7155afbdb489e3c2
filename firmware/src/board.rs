//! Pin map and peripheral assignment for the stimulator board (nRF52833).
//!
//! | function            | resource            |
//! |---------------------|---------------------|
//! | pulse output        | P0.03, GPIOTE ch 0  |
//! | mirror output       | P0.04, GPIOTE ch 1  |
//! | run indicator       | P0.28               |
//! | MUX SCK / MOSI / LE | P0.17 / P0.13 / P0.20, SPIM2 |
//! | DAC SCK / MOSI / LDAC | P0.22 / P0.24 / P0.25, SPIM3 |
//! | sense input         | P0.02 (AIN0), SAADC |
//! | console RX / TX     | P0.08 / P0.06, UARTE0 |
//! | pulse timer         | TIMER1              |
//! | state timer         | TIMER2              |
//! | console timer       | TIMER0, PPI ch 18-19 |

use embassy_nrf::uarte::Baudrate;
use embassy_time::Duration;

/// Port 0 indices of the latch strobes, driven from the SPIM END handlers.
pub const MUX_LATCH_PIN: usize = 20;
pub const DAC_LATCH_PIN: usize = 25;

pub const PULSE_GPIOTE_CHANNEL: usize = 0;
pub const MIRROR_GPIOTE_CHANNEL: usize = 1;

/// Copy the stimulation edges onto the status mirror pin.
pub const MIRROR_ENABLED: bool = true;

pub const CONSOLE_BAUD: Baudrate = Baudrate::BAUD115200;
pub const CONSOLE_RX_BUFFER: usize = 128;
pub const CONSOLE_TX_BUFFER: usize = 256;

/// A partially received request is dropped after this much receive idle.
pub const LINE_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

pub const DIAGNOSTICS_INTERVAL: Duration = Duration::from_millis(250);
