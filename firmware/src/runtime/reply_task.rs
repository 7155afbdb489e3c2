use embassy_nrf::buffered_uarte::BufferedUarteTx;
use embedded_io_async::Write;

use super::REPLIES;

/// Writes queued reply lines to the console in order.
#[embassy_executor::task]
pub async fn run(mut tx: BufferedUarteTx<'static>) -> ! {
    loop {
        let line = REPLIES.receive().await;
        if tx.write_all(line.as_bytes()).await.is_err() {
            defmt::warn!("console: UART write error, dropped {} bytes", line.len());
            continue;
        }
        if tx.flush().await.is_err() {
            defmt::warn!("console: UART flush error");
        }
    }
}
