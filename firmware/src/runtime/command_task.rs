use embassy_futures::select::{Either, select};
use embassy_nrf::buffered_uarte::BufferedUarteRx;
use embassy_time::Timer;
use embedded_io_async::Read;
use stim_core::command::{CommandExecutor, Reply};

use super::{CONFIG, REPLIES, SEQUENCER};
use crate::board;
use crate::hw::adc;
use crate::line::{LineAssembler, LineError, render_reply};

/// Reads request lines from the console and queues one reply per line.
#[embassy_executor::task]
pub async fn run(mut rx: BufferedUarteRx<'static>) -> ! {
    let mut executor =
        CommandExecutor::new(&CONFIG, &SEQUENCER).with_sample_source(adc::latest_sample);
    let mut assembler = LineAssembler::new();
    let mut chunk = [0u8; 32];

    loop {
        let read = if assembler.has_partial() {
            match select(rx.read(&mut chunk), Timer::after(board::LINE_IDLE_TIMEOUT)).await {
                Either::First(read) => read,
                Either::Second(()) => {
                    defmt::warn!("console: dropping partial line after receive idle");
                    assembler.reset();
                    continue;
                }
            }
        } else {
            rx.read(&mut chunk).await
        };

        let Ok(count) = read else {
            defmt::warn!("console: UART read error");
            assembler.reset();
            continue;
        };

        for &byte in &chunk[..count] {
            let reply = match assembler.push(byte) {
                None => continue,
                Some(Ok(line)) => executor.respond(line),
                Some(Err(LineError::Overflow)) => {
                    defmt::warn!("console: request line too long");
                    Reply::Unparsable
                }
                Some(Err(LineError::InvalidUtf8)) => Reply::Unparsable,
            };
            REPLIES.send(render_reply(&reply)).await;
        }
    }
}
