// Centralize all configuration constants

/// Peripheral clock feeding both capture timers.
pub const PCLK_HZ: u32 = 24_000_000;

/// Wheel-speed capture timer prescaler (100 kHz tick, takes 0.65 s to wrap).
pub const SPEED_TIMER_PSC: u32 = 240;
/// Engine capture timer prescaler (400 kHz tick, takes 0.163 s to wrap).
pub const RPM_TIMER_PSC: u32 = 60;
/// Pulses delivered by the engine pickup per crankshaft revolution.
pub const RPM_PULSES_PER_REV: u32 = 60;

/// Strain-gauge evaluation cadence.
pub const STRAIN_PERIOD_MS: u64 = 100;
/// Host-link poll cadence.
pub const SERIAL_POLL_MS: u64 = 50;
pub const POLLS_PER_SECOND: u32 = (1000 / SERIAL_POLL_MS) as u32;

/// Continuously refreshed analog sample window and the taps averaged out of it.
pub const SAMPLE_WINDOW_LEN: usize = 20;
pub const GAUGE_TAPS: usize = 5;
pub const GAUGE_STRIDE: usize = 4;

/// Ready-condition polls allowed per potentiometer byte transfer.
pub const WIPER_POLL_BUDGET: u32 = 100;
/// Delay between ready polls on hardware.
pub const WIPER_POLL_DELAY_US: u64 = 50;

/// Host receive buffer.
pub const RX_BUFFER_SIZE: usize = 256;
pub const UART_BAUDRATE: u32 = 115_200;

// Channel sizes
pub const SENSOR_EVENT_QUEUE: usize = 16;

// Reported by SEND_INFO
pub const FW_VERSION_MAJOR: u8 = 1;
pub const FW_VERSION_MINOR: u8 = 0;
pub const HW_REV: u8 = 1;
