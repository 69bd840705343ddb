use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex as RawMutex, Mutex},
    channel::Channel,
};

use crate::config::SENSOR_EVENT_QUEUE;
use crate::settings::SettingsData;
use bytemuck::{Pod, Zeroable};
use core::cell::Cell;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

/// Wire-format diagnostics packet: exactly what SEND_DIAG copies out to the
/// host, so the field layout is frozen.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Zeroable, Pod)]
pub struct SensorSnapshot {
    pub shifting: u8,
    pub _pad: [u8; 3],
    pub speed_hz: u32,
    pub rpm: u32,
    pub slip_pct: i32,
}

/// Which capture input a timer event came from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "stm32f072", derive(defmt::Format))]
pub enum CaptureSource {
    FrontWheel,
    RearWheel,
    Engine,
}

/// Everything the sensor consumer task reacts to. Capture events come from
/// interrupt context; shifting updates come from the strain monitor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "stm32f072", derive(defmt::Format))]
pub enum SensorEvent {
    Capture { source: CaptureSource, count: u16 },
    Shifting(bool),
}

/// Event queue from interrupt handlers (and the strain monitor) to the one
/// task that owns the snapshot. Interrupt side uses `try_send` only.
pub static SENSOR_EVENTS: Channel<RawMutex, SensorEvent, SENSOR_EVENT_QUEUE> = Channel::new();

/// Capture events dropped because the queue was full.
pub static DROPPED_EVENTS: AtomicU32 = AtomicU32::new(0);

/// Raised by the receive path, consumed by the 50 ms protocol poll.
pub static RX_PENDING: AtomicBool = AtomicBool::new(false);

static LATEST_SENSORS_PTR: AtomicPtr<SensorSnapshot> = AtomicPtr::new(core::ptr::null_mut());
static mut SENSORS_A: SensorSnapshot = SensorSnapshot {
    shifting: 0,
    _pad: [0; 3],
    speed_hz: 0,
    rpm: 0,
    slip_pct: 0,
};
static mut SENSORS_B: SensorSnapshot = SensorSnapshot {
    shifting: 0,
    _pad: [0; 3],
    speed_hz: 0,
    rpm: 0,
    slip_pct: 0,
};

/// Publish a new snapshot: fill the inactive buffer, then switch the pointer.
/// Readers always see a whole snapshot, never a torn one.
pub fn publish_sensors(new: &SensorSnapshot) {
    let current = LATEST_SENSORS_PTR.load(Ordering::Acquire);
    #[allow(static_mut_refs)]
    let next = unsafe {
        if current == &SENSORS_A as *const _ as *mut _ {
            &mut SENSORS_B
        } else {
            &mut SENSORS_A
        }
    };

    *next = *new;

    // Atomic switch
    LATEST_SENSORS_PTR.store(next as *mut _, Ordering::Release);
}

/// Point-in-time copy of the last published snapshot; zeroed until the
/// first publish.
pub fn latest_sensors() -> SensorSnapshot {
    let ptr = LATEST_SENSORS_PTR.load(Ordering::Acquire);
    if ptr.is_null() {
        SensorSnapshot::zeroed()
    } else {
        unsafe { *ptr }
    }
}

static SETTINGS: Mutex<RawMutex, Cell<SettingsData>> =
    Mutex::new(Cell::new(SettingsData::boot_default()));

/// Copy of the active settings. Read every cycle by the sensor paths.
pub fn current_settings() -> SettingsData {
    SETTINGS.lock(|cell| cell.get())
}

/// Wholesale replacement; the only writers are a validated save-settings
/// command and the boot-time load.
pub fn replace_settings(new: SettingsData) {
    SETTINGS.lock(|cell| cell.set(new));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_read_round_trips() {
        let _guard = crate::mock::shared_state_guard();
        let snap = SensorSnapshot {
            shifting: 1,
            _pad: [0; 3],
            speed_hz: 120,
            rpm: 7300,
            slip_pct: -4,
        };
        publish_sensors(&snap);
        assert_eq!(latest_sensors(), snap);

        // Second publish lands in the other buffer and still reads back whole.
        let snap2 = SensorSnapshot { speed_hz: 121, ..snap };
        publish_sensors(&snap2);
        assert_eq!(latest_sensors(), snap2);
    }

    #[test]
    fn snapshot_wire_layout_is_16_bytes() {
        assert_eq!(core::mem::size_of::<SensorSnapshot>(), 16);
        let snap = SensorSnapshot {
            shifting: 1,
            _pad: [0; 3],
            speed_hz: 0x0102_0304,
            rpm: 2,
            slip_pct: -1,
        };
        let bytes = bytemuck::bytes_of(&snap);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[12..16], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn settings_cell_replaces_wholesale() {
        let _guard = crate::mock::shared_state_guard();
        let mut s = current_settings();
        s.sensor_threshold = 777;
        replace_settings(s);
        assert_eq!(current_settings().sensor_threshold, 777);
        replace_settings(SettingsData::boot_default());
    }
}
