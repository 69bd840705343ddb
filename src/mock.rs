//! Mock collaborators for host-side tests (and for bench harnesses built
//! with the `mock` feature).

use heapless::Vec;

use crate::config::SAMPLE_WINDOW_LEN;
use crate::drivers::pot::WiperBus;
use crate::drivers::strain::SampleSource;
use crate::protocol::{ResponseSink, SinkError};
use crate::settings::{SettingsData, SettingsStore, StoreError};

/// Scripted I2C master. `ready_after(n, ..)` makes each byte transfer report
/// ready on its `n + 1`-th check; `never_ready` never does.
pub struct MockWiperBus {
    ready_after: Option<u32>,
    checks_since_load: u32,
    rx_byte: u8,
    pub tx: Vec<u8, 8>,
    pub polls: u32,
    pub writes_started: u32,
    pub reads_started: u32,
}

impl MockWiperBus {
    pub fn ready_immediately(rx_byte: u8) -> Self {
        Self::ready_after(0, rx_byte)
    }

    pub fn ready_after(checks: u32, rx_byte: u8) -> Self {
        Self {
            ready_after: Some(checks),
            checks_since_load: 0,
            rx_byte,
            tx: Vec::new(),
            polls: 0,
            writes_started: 0,
            reads_started: 0,
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready_after: None,
            checks_since_load: 0,
            rx_byte: 0,
            tx: Vec::new(),
            polls: 0,
            writes_started: 0,
            reads_started: 0,
        }
    }

    fn check(&mut self) -> bool {
        self.checks_since_load += 1;
        match self.ready_after {
            Some(n) => self.checks_since_load > n,
            None => false,
        }
    }
}

impl WiperBus for MockWiperBus {
    fn begin_write(&mut self, _addr: u8, _len: usize) {
        self.writes_started += 1;
        self.checks_since_load = 0;
    }

    fn begin_read(&mut self, _addr: u8, _len: usize) {
        self.reads_started += 1;
        self.checks_since_load = 0;
    }

    fn load_tx(&mut self, byte: u8) {
        let _ = self.tx.push(byte);
        self.checks_since_load = 0;
    }

    fn tx_complete(&mut self) -> bool {
        self.check()
    }

    fn rx_ready(&mut self) -> bool {
        self.check()
    }

    fn take_rx(&mut self) -> u8 {
        self.rx_byte
    }

    async fn poll_delay(&mut self) {
        self.polls += 1;
    }
}

/// Captures outbound host responses.
#[derive(Default)]
pub struct MockSink {
    pub frames: Vec<Vec<u8, 64>, 8>,
}

impl MockSink {
    pub fn last(&self) -> Option<&[u8]> {
        self.frames.last().map(|f| f.as_slice())
    }
}

impl ResponseSink for MockSink {
    async fn send(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let mut frame = Vec::new();
        frame.extend_from_slice(data).map_err(|_| SinkError)?;
        self.frames.push(frame).map_err(|_| SinkError)
    }
}

/// In-memory settings persistence.
#[derive(Default)]
pub struct MemStore {
    pub saved: Option<SettingsData>,
    pub fail_save: bool,
}

impl SettingsStore for MemStore {
    fn load(&mut self) -> Result<SettingsData, StoreError> {
        self.saved.ok_or(StoreError::Io)
    }

    fn save(&mut self, settings: &SettingsData) -> Result<(), StoreError> {
        if self.fail_save {
            return Err(StoreError::Io);
        }
        self.saved = Some(*settings);
        Ok(())
    }
}

/// Replays a canned conversion window.
pub struct MockSampleSource {
    pub window: [u16; SAMPLE_WINDOW_LEN],
}

impl SampleSource for MockSampleSource {
    async fn fill(&mut self, window: &mut [u16; SAMPLE_WINDOW_LEN]) {
        *window = self.window;
    }
}

/// Serializes tests that touch the process-wide snapshot and settings state.
#[cfg(test)]
pub fn shared_state_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
