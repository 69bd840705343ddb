//! Digital-potentiometer transaction driver.
//!
//! Byte-level I2C plumbing lives behind [`WiperBus`] so the transaction
//! shape (bounded ready-polling, read-back, commit-on-success) is testable
//! off-target. Every byte transfer gets a fixed poll budget; exhausting it
//! aborts the whole transaction and leaves the cached wiper untouched, so
//! the caller naturally retries on its next cycle.

use crate::config::WIPER_POLL_BUDGET;
use crate::drivers::pot::protocol::{encode_set_wiper, DEVICE_ADDR};
use crate::log_warn;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "stm32f072", derive(defmt::Format))]
pub enum PotError {
    /// A byte transfer never signalled ready within the poll budget.
    Timeout,
}

/// Minimal byte-at-a-time I2C master surface. `poll_delay` yields between
/// ready checks; on hardware it is a short timer wait, in tests it just
/// advances the mock.
#[allow(async_fn_in_trait)]
pub trait WiperBus {
    fn begin_write(&mut self, addr: u8, len: usize);
    fn begin_read(&mut self, addr: u8, len: usize);
    fn load_tx(&mut self, byte: u8);
    fn tx_complete(&mut self) -> bool;
    fn rx_ready(&mut self) -> bool;
    fn take_rx(&mut self) -> u8;
    async fn poll_delay(&mut self);
}

/// Poll `ready` up to the budget, yielding between checks.
async fn wait_ready<B: WiperBus>(
    bus: &mut B,
    ready: fn(&mut B) -> bool,
) -> Result<(), PotError> {
    for _ in 0..WIPER_POLL_BUDGET {
        if ready(bus) {
            return Ok(());
        }
        bus.poll_delay().await;
    }
    Err(PotError::Timeout)
}

pub struct PotController<B: WiperBus> {
    bus: B,
    wiper: u8,
    applied: Option<u8>,
}

impl<B: WiperBus> PotController<B> {
    pub fn new(bus: B, initial_wiper: u8) -> Self {
        Self {
            bus,
            wiper: initial_wiper,
            applied: None,
        }
    }

    /// Last register value the device itself confirmed via read-back.
    pub fn wiper(&self) -> u8 {
        self.wiper
    }

    /// Whether `target` still needs an apply: true until a transaction
    /// requesting exactly this value has completed. Keyed on the request,
    /// not the confirmed register, so a device that clamps the written
    /// value is not re-written on every cycle.
    pub fn needs_apply(&self, target: u8) -> bool {
        self.applied != Some(target)
    }

    /// Write the wiper register, then read it back. The read-back byte is
    /// what the cache commits; a timeout anywhere leaves both the cache and
    /// the applied-request marker untouched, so the caller retries.
    pub async fn apply_wiper(&mut self, value: u8) -> Result<u8, PotError> {
        let frame = encode_set_wiper(value);

        self.bus.begin_write(DEVICE_ADDR, frame.len());
        for byte in frame {
            self.bus.load_tx(byte);
            if let Err(e) = wait_ready(&mut self.bus, B::tx_complete).await {
                log_warn!("pot write timed out, wiper stays {}", self.wiper);
                return Err(e);
            }
        }

        self.bus.begin_read(DEVICE_ADDR, 1);
        if let Err(e) = wait_ready(&mut self.bus, B::rx_ready).await {
            log_warn!("pot read-back timed out, wiper stays {}", self.wiper);
            return Err(e);
        }
        let echoed = self.bus.take_rx();

        self.wiper = echoed;
        self.applied = Some(value);
        Ok(echoed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWiperBus;

    #[tokio::test]
    async fn apply_wiper_writes_encoded_frame() {
        let mut pot = PotController::new(MockWiperBus::ready_immediately(0x05), 0);
        let echoed = pot.apply_wiper(0x85).await.unwrap();
        assert_eq!(echoed, 0x05);

        let bus = pot.bus;
        assert_eq!(bus.tx.as_slice(), &[0x41, 0x05]);
        assert_eq!(bus.writes_started, 1);
        assert_eq!(bus.reads_started, 1);
    }

    #[tokio::test]
    async fn cache_commits_device_confirmed_value() {
        // Device clamps the requested 0x85 and echoes 0x05: the cache holds
        // what the register actually reads, while the request is still
        // considered applied and is not retried.
        let mut pot = PotController::new(MockWiperBus::ready_immediately(0x05), 0);
        pot.apply_wiper(0x85).await.unwrap();
        assert_eq!(pot.wiper(), 0x05);
        assert!(!pot.needs_apply(0x85));
        assert!(pot.needs_apply(0x20));
    }

    #[tokio::test]
    async fn budget_allows_exactly_one_hundred_checks() {
        // Ready on the 100th check: still inside the budget.
        let mut pot = PotController::new(MockWiperBus::ready_after(99, 0x10), 7);
        assert!(pot.apply_wiper(0x10).await.is_ok());
        assert_eq!(pot.wiper(), 0x10);

        // Ready on what would be the 101st check: timeout, cache untouched,
        // request still pending.
        let mut pot = PotController::new(MockWiperBus::ready_after(100, 0x10), 7);
        assert_eq!(pot.apply_wiper(0x10).await, Err(PotError::Timeout));
        assert_eq!(pot.wiper(), 7);
        assert!(pot.needs_apply(0x10));
        assert_eq!(pot.bus.polls, 100);
    }

    #[tokio::test]
    async fn write_timeout_skips_read_phase() {
        let mut pot = PotController::new(MockWiperBus::never_ready(), 42);
        assert_eq!(pot.apply_wiper(0x20).await, Err(PotError::Timeout));
        assert_eq!(pot.wiper(), 42);
        assert_eq!(pot.bus.reads_started, 0);
    }
}
