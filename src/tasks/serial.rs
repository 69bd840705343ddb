use embassy_executor::task;
use embassy_time::{with_timeout, Duration, Ticker};
use embedded_io_async::Read;
use portable_atomic::Ordering;

use crate::board::UartSink;
use crate::config::{RX_BUFFER_SIZE, SERIAL_POLL_MS};
use crate::ipc::RX_PENDING;
use crate::protocol::{HostLink, PollOutcome};
use crate::settings::flash::FlashStore;
use crate::{log_error, log_info, log_warn};

/// How long to wait on the ring buffer for further bytes each cycle. The
/// host sends short frames; anything in flight lands well within this.
const DRAIN_BUDGET: Duration = Duration::from_micros(500);

/// 50 ms host-link cycle: drain the UART ring buffer into the frame buffer,
/// then hand it to the link for one poll.
#[task]
pub async fn serial_task(
    mut rx: embassy_stm32::usart::RingBufferedUartRx<'static>,
    sink: UartSink,
    store: FlashStore,
) {
    log_info!("host link up");
    let mut link = HostLink::new(store, sink);
    let mut ticker = Ticker::every(Duration::from_millis(SERIAL_POLL_MS));
    let mut buf = [0u8; RX_BUFFER_SIZE];
    let mut fill = 0usize;

    loop {
        ticker.next().await;

        while fill < buf.len() {
            match with_timeout(DRAIN_BUDGET, rx.read(&mut buf[fill..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    fill += n;
                    RX_PENDING.store(true, Ordering::Release);
                }
                Ok(Err(e)) => {
                    log_error!("uart receive error: {:?}", e);
                    break;
                }
                // Quiet line this cycle.
                Err(_) => break,
            }
        }

        match link.poll(&mut buf, &RX_PENDING).await {
            PollOutcome::Dispatched(_) => fill = 0,
            PollOutcome::Incomplete if fill == buf.len() => {
                // Full buffer with no valid frame is unrecoverable noise.
                log_warn!("discarding {} bytes of unframed input", fill);
                buf.fill(0);
                fill = 0;
                RX_PENDING.store(false, Ordering::Release);
            }
            _ => {}
        }
    }
}
