use defmt::Display2Format;
use embassy_time::Ticker;

use super::DIAGNOSTICS;
use crate::board;

/// Moves records queued by the timing ISR out to the log.
#[embassy_executor::task]
pub async fn run() -> ! {
    let mut ticker = Ticker::every(board::DIAGNOSTICS_INTERVAL);
    loop {
        ticker.next().await;

        DIAGNOSTICS.drain(|record| {
            defmt::info!("[T{}] {}", record.transition, Display2Format(&record.event));
        });

        let overflowed = DIAGNOSTICS.take_overflow_count();
        if overflowed > 0 {
            defmt::warn!("diagnostics: {} records lost", overflowed);
        }
    }
}
